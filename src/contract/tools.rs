use std::collections::BTreeSet;

pub fn build_allowed_tools(tool_names: &[&str], schema_name: Option<&str>) -> BTreeSet<String> {
    tool_names
        .iter()
        .copied()
        .chain(schema_name)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
