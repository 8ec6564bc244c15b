//! Export query body for the CAROL `FileExport` endpoint.

use chrono::NaiveDate;
use serde::Serialize;

/// Description of the column a rule filters on, as the query builder UI
/// sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SelectedOption {
    pub field_name: &'static str,
    pub display_text: &'static str,
    pub columns: Vec<&'static str>,
    pub selectable: bool,
    pub input_type: &'static str,
    pub rule_type: u8,
    pub options: Option<Vec<String>>,
    pub target_collection: &'static str,
    pub under_development: bool,
}

impl SelectedOption {
    fn event_date() -> Self {
        Self {
            field_name: "EventDate",
            display_text: "Event date",
            columns: vec![EVENT_DATE_COLUMN],
            selectable: true,
            input_type: "Date",
            rule_type: 0,
            options: None,
            target_collection: TARGET_COLLECTION,
            under_development: true,
        }
    }

    fn mode() -> Self {
        Self {
            field_name: "Mode",
            display_text: "Investigation mode",
            columns: vec![MODE_COLUMN],
            selectable: true,
            input_type: "Dropdown",
            rule_type: 0,
            options: None,
            target_collection: TARGET_COLLECTION,
            under_development: true,
        }
    }
}

/// One simple filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryRule {
    pub rule_type: &'static str,
    pub values: Vec<String>,
    pub columns: Vec<&'static str>,
    pub operator: &'static str,
    #[serde(rename = "overrideColumn")]
    pub override_column: &'static str,
    #[serde(rename = "selectedOption")]
    pub selected_option: SelectedOption,
}

impl QueryRule {
    fn simple(
        value: String,
        column: &'static str,
        operator: &'static str,
        selected_option: SelectedOption,
    ) -> Self {
        Self {
            rule_type: "Simple",
            values: vec![value],
            columns: vec![column],
            operator,
            override_column: "",
            selected_option,
        }
    }
}

/// Rules combined with a boolean operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryGroup {
    pub query_rules: Vec<QueryRule>,
    pub and_or: &'static str,
    #[serde(rename = "inLastSearch")]
    pub in_last_search: bool,
    #[serde(rename = "editedSinceLastSearch")]
    pub edited_since_last_search: bool,
}

/// Full request body of a month export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportQuery {
    pub query_groups: Vec<QueryGroup>,
    pub and_or: &'static str,
    pub target_collection: &'static str,
    pub export_format: &'static str,
    pub session_id: u64,
    pub result_set_size: u32,
    pub sort_descending: bool,
}

const EVENT_DATE_COLUMN: &str = "Event.EventDate";
const MODE_COLUMN: &str = "Event.Mode";
const TARGET_COLLECTION: &str = "cases";

impl ExportQuery {
    /// Builds the query for events on or between `first` and `last`
    /// (inclusive) whose investigation mode equals `mode`.
    #[must_use]
    pub fn for_range(
        first: NaiveDate,
        last: NaiveDate,
        mode: &str,
        session_id: u64,
        result_set_size: u32,
    ) -> Self {
        let rules = vec![
            QueryRule::simple(
                first.format("%Y-%m-%d").to_string(),
                EVENT_DATE_COLUMN,
                "is on or after",
                SelectedOption::event_date(),
            ),
            QueryRule::simple(
                last.format("%Y-%m-%d").to_string(),
                EVENT_DATE_COLUMN,
                "is on or before",
                SelectedOption::event_date(),
            ),
            QueryRule::simple(mode.to_owned(), MODE_COLUMN, "is", SelectedOption::mode()),
        ];

        Self {
            query_groups: vec![QueryGroup {
                query_rules: rules,
                and_or: "and",
                in_last_search: false,
                edited_since_last_search: false,
            }],
            and_or: "and",
            target_collection: TARGET_COLLECTION,
            export_format: "data",
            session_id,
            result_set_size,
            sort_descending: true,
        }
    }
}
