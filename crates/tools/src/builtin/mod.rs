//! The built-in tool set.

mod calendar;
mod files;
mod finance;
mod geo;
mod graph;
mod pattern;
mod python;
mod units;
mod weather;
mod web;

pub use calendar::CreateCalendarEvent;
pub use files::{
    AppendToFile, ChangeDirectory, DeleteFile, ListFiles, ReadFile, ShowDirectoryTree, WriteFile,
};
pub use finance::CalculateCompoundInterest;
pub use geo::GetAddressFromCoordinates;
pub use graph::VisualizeGraph;
pub use pattern::TestRegexPattern;
pub use python::RunPythonCode;
pub use units::ConvertUnits;
pub use weather::GetWeather;
pub use web::OpenAndReadWebsite;

use crate::{Tool, ToolError};
use std::sync::Arc;

/// Every built-in tool, in a fixed order.
pub fn all() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(CalculateCompoundInterest),
        Arc::new(GetWeather),
        Arc::new(WriteFile),
        Arc::new(ReadFile),
        Arc::new(ListFiles),
        Arc::new(ShowDirectoryTree),
        Arc::new(ChangeDirectory),
        Arc::new(RunPythonCode),
        Arc::new(GetAddressFromCoordinates),
        Arc::new(OpenAndReadWebsite),
        Arc::new(CreateCalendarEvent),
        Arc::new(TestRegexPattern),
        Arc::new(ConvertUnits),
        Arc::new(VisualizeGraph),
        Arc::new(AppendToFile),
        Arc::new(DeleteFile),
    ]
}

/// Pick built-in tools by name, preserving the requested order.
pub fn by_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<Arc<dyn Tool>>, ToolError> {
    let available = all();
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            available
                .iter()
                .find(|t| t.name() == name)
                .cloned()
                .ok_or_else(|| ToolError::NotFound(name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sixteen_unique_tools() {
        let tools = all();
        assert_eq!(tools.len(), 16);
        let names: HashSet<_> = tools.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names.len(), 16);
        assert_eq!(tools[0].name(), "calculate_compound_interest");
        assert_eq!(tools[15].name(), "delete_file");
    }

    #[test]
    fn schemas_are_objects() {
        for tool in all() {
            let schema = tool.parameters_schema();
            assert_eq!(schema["type"], "object", "{}", tool.name());
            assert!(!tool.description().is_empty());
        }
    }

    #[test]
    fn by_names_keeps_order_and_rejects_unknown() {
        let picked = by_names(&["read_file", "get_weather"]).unwrap();
        assert_eq!(picked[0].name(), "read_file");
        assert_eq!(picked[1].name(), "get_weather");

        let err = by_names(&["teleport"]).err().unwrap();
        assert_eq!(err, ToolError::NotFound("teleport".into()));
    }
}
