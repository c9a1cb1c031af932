use crate::state::StateUpdate;

pub const END: &str = "__end__";

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub update: StateUpdate,
    pub goto: String,
}

impl Command {
    pub fn goto(target: &str) -> Self {
        Self {
            update: StateUpdate::new(),
            goto: target.to_string(),
        }
    }

    pub fn end() -> Self {
        Self::goto(END)
    }

    pub fn with_update(mut self, update: StateUpdate) -> Self {
        self.update = self.update.merge(update);
        self
    }

    pub fn is_end(&self) -> bool {
        self.goto == END
    }
}
