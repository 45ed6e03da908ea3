use std::fs;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use snafu::prelude::*;

use review_merging::{MergeSettings, SheetLayout};

use crate::merge::{MergeError, MergeResult, OpeningJsonSnafu, ParsingJsonSnafu};

/// The raw configuration record, as found in the JSON file. Every field is
/// optional at parsing time; `validate` checks completeness in one pass.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(rename = "masterFile")]
    pub master_file: Option<String>,
    #[serde(rename = "inputFolder")]
    pub input_folder: Option<String>,
    #[serde(rename = "outputFolder")]
    pub output_folder: Option<String>,
    #[serde(rename = "overviewSheetName")]
    pub overview_sheet_name: Option<String>,
    #[serde(rename = "feedbackSheetName")]
    pub feedback_sheet_name: Option<String>,
    #[serde(rename = "numTasks")]
    pub num_tasks: Option<usize>,
    #[serde(rename = "columnsPerTask")]
    pub columns_per_task: Option<u32>,
    #[serde(rename = "reviewersPerTask")]
    pub reviewers_per_task: Option<u32>,
}

/// The fully-populated configuration of one merge run.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ValidConfig {
    pub master_file: String,
    pub input_folder: String,
    pub output_folder: String,
    pub overview_sheet_name: String,
    pub feedback_sheet_name: String,
    pub num_tasks: usize,
    pub columns_per_task: u32,
    pub reviewers_per_task: u32,
}

impl ValidConfig {
    pub fn settings(&self) -> MergeSettings {
        MergeSettings {
            num_tasks: self.num_tasks,
            columns_per_task: self.columns_per_task,
            reviewers_per_task: self.reviewers_per_task,
            layout: SheetLayout::DEFAULT,
        }
    }
}

impl MergeConfig {
    /// Checks the record atomically, before any other work starts. Every
    /// missing field is reported, not just the first one.
    pub fn validate(&self) -> MergeResult<ValidConfig> {
        let mut missing: Vec<String> = Vec::new();
        let master_file = take(&self.master_file, "masterFile", &mut missing);
        let input_folder = take(&self.input_folder, "inputFolder", &mut missing);
        let output_folder = take(&self.output_folder, "outputFolder", &mut missing);
        let overview_sheet_name =
            take(&self.overview_sheet_name, "overviewSheetName", &mut missing);
        let feedback_sheet_name =
            take(&self.feedback_sheet_name, "feedbackSheetName", &mut missing);
        let num_tasks = take(&self.num_tasks, "numTasks", &mut missing);
        let columns_per_task = take(&self.columns_per_task, "columnsPerTask", &mut missing);
        let reviewers_per_task = take(&self.reviewers_per_task, "reviewersPerTask", &mut missing);

        match (
            master_file,
            input_folder,
            output_folder,
            overview_sheet_name,
            feedback_sheet_name,
            num_tasks,
            columns_per_task,
            reviewers_per_task,
        ) {
            (
                Some(master_file),
                Some(input_folder),
                Some(output_folder),
                Some(overview_sheet_name),
                Some(feedback_sheet_name),
                Some(num_tasks),
                Some(columns_per_task),
                Some(reviewers_per_task),
            ) => Ok(ValidConfig {
                master_file,
                input_folder,
                output_folder,
                overview_sheet_name,
                feedback_sheet_name,
                num_tasks,
                columns_per_task,
                reviewers_per_task,
            }),
            _ => Err(MergeError::ConfigurationIncomplete { missing }),
        }
    }
}

fn take<T: Clone>(value: &Option<T>, name: &str, missing: &mut Vec<String>) -> Option<T> {
    if value.is_none() {
        missing.push(name.to_string());
    }
    value.clone()
}

pub fn read_merge_config(path: &str) -> MergeResult<MergeConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read_merge_config: {:?}", contents);
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})
}

pub fn read_summary(path: &str) -> MergeResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})
}
