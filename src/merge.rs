use log::{info, warn};

use review_merging::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::merge::config_reader::*;

pub mod config_reader;
pub mod io_xlsx;

/// Name of the merged workbook inside the output folder.
pub const OUTPUT_FILE_NAME: &str = "Merged.xlsx";

#[derive(Debug, Snafu)]
pub enum MergeError {
    #[snafu(display("Error opening workbook {path}"))]
    OpeningWorkbook {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Missing worksheet {name} in workbook {path}"))]
    MissingWorksheet { name: String, path: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON content"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("The configuration is incomplete, missing fields: {}", missing.join(", ")))]
    ConfigurationIncomplete { missing: Vec<String> },
    #[snafu(display("Invalid merge strategy: {strategy}"))]
    UnknownStrategy { strategy: String },
    #[snafu(display("Merging failed: {source}"))]
    Reconciling { source: ReconcileError },
    #[snafu(display("Cannot save the merged file {path}. Is the file open elsewhere?"))]
    SavingWorkbook {
        source: rust_xlsxwriter::XlsxError,
        path: String,
    },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type MergeResult<T> = Result<T, MergeError>;

/// Runs the full merge described by the command line arguments: configuration
/// reading and validation, strategy dispatch, the merge itself, the
/// diagnostics summary and the optional reference comparison.
pub fn run_merge(args: &Args) -> MergeResult<()> {
    let config = read_merge_config(&args.config)?.validate()?;
    info!("config: {:?}", config);

    let strategy = args.strategy.clone().unwrap_or_else(|| "excel".to_string());
    let report = match strategy.as_str() {
        "excel" => run_excel_merge(&config)?,
        _ => return Err(MergeError::UnknownStrategy { strategy }),
    };

    let summary = build_summary_js(&report);
    let pretty_js_summary = serde_json::to_string_pretty(&summary).context(ParsingJsonSnafu {})?;
    match args.out.as_deref() {
        Some("stdout") => println!("{}", pretty_js_summary),
        Some(path) => {
            fs::write(path, &pretty_js_summary).context(WritingSummarySnafu { path })?
        }
        None => info!("summary: {}", pretty_js_summary),
    }

    // The reference summary, if provided for comparison
    if let Some(reference_path) = &args.reference {
        let reference = read_summary(reference_path)?;
        let pretty_js_reference =
            serde_json::to_string_pretty(&reference).context(ParsingJsonSnafu {})?;
        if pretty_js_reference != pretty_js_summary {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_reference.as_str(),
                pretty_js_summary.as_ref(),
                "\n",
            );
            whatever!("Difference detected between the merge summary and the reference summary");
        }
    }

    Ok(())
}

fn run_excel_merge(config: &ValidConfig) -> MergeResult<MergeReport> {
    let overview = io_xlsx::load_sheet(&config.master_file, &config.overview_sheet_name)?;
    let mut feedback = io_xlsx::load_sheet(&config.master_file, &config.feedback_sheet_name)?;
    let submissions = io_xlsx::FolderSubmissions::new(
        Path::new(&config.input_folder),
        &config.feedback_sheet_name,
    );

    let report = run_merge_stats(&overview, &mut feedback, &submissions, &config.settings())
        .context(ReconcilingSnafu)?;

    let merged_path = Path::new(&config.output_folder).join(OUTPUT_FILE_NAME);
    io_xlsx::save_workbook(
        &merged_path,
        &[
            (config.overview_sheet_name.as_str(), &overview),
            (config.feedback_sheet_name.as_str(), &feedback),
        ],
    )?;
    info!(
        "Finished merging, wrote the merged workbook to {}",
        merged_path.display()
    );
    Ok(report)
}

fn build_summary_js(report: &MergeReport) -> JSValue {
    json!({
        "numStudents": report.num_students,
        "unsubmitted": report.unsubmitted,
        "missingReviews": issues_to_json(&report.missing_reviews),
        "violatingReviews": issues_to_json(&report.violating_reviews),
        "feedbackEntries": report.feedback_entries,
    })
}

fn issues_to_json(issues: &[ReviewIssue]) -> Vec<JSValue> {
    issues
        .iter()
        .map(|issue| {
            json!({
                "reviewer": issue.reviewer_username,
                "reviewerNumber": issue.reviewer,
                "task": issue.task,
                "reviewee": issue.reviewee,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;
    use std::path::PathBuf;

    fn temp_workspace(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("revmerge-{}-{}", name, std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    // The master workbook: 3 students, 1 task, 2 reviewers per task.
    // alice reviews 2 and 3, bob reviews 3 and 1, carol reviews 1 and 2.
    fn write_master(path: &Path) {
        let mut workbook = Workbook::new();

        let overview = workbook.add_worksheet();
        overview.set_name("Overview").unwrap();
        overview.write_string(0, 0, "Nr").unwrap();
        overview.write_string(0, 1, "Username").unwrap();
        let assignments: [(&str, [f64; 2]); 3] =
            [("alice", [2.0, 3.0]), ("bob", [3.0, 1.0]), ("carol", [1.0, 2.0])];
        for (i, (username, reviewees)) in assignments.iter().enumerate() {
            let row = (i + 1) as u32;
            overview.write_number(row, 0, (i + 1) as f64).unwrap();
            overview.write_string(row, 1, *username).unwrap();
            overview.write_number(row, 2, reviewees[0]).unwrap();
            overview.write_number(row, 3, reviewees[1]).unwrap();
        }

        let feedback = workbook.add_worksheet();
        feedback.set_name("Feedback").unwrap();
        feedback.write_string(0, 0, "Nr").unwrap();
        feedback.write_string(0, 1, "Username").unwrap();
        for (i, (username, _)) in assignments.iter().enumerate() {
            let row = (i + 1) as u32;
            feedback.write_number(row, 0, (i + 1) as f64).unwrap();
            feedback.write_string(row, 1, *username).unwrap();
        }

        workbook.save(path).unwrap();
    }

    // A submission workbook: the numbered feedback sheet with the given
    // filled blocks, each as (reviewee, [answer, grade]).
    fn write_submission(path: &Path, blocks: &[(u32, (&str, f64))]) {
        let mut workbook = Workbook::new();
        let feedback = workbook.add_worksheet();
        feedback.set_name("Feedback").unwrap();
        feedback.write_string(0, 0, "Nr").unwrap();
        for i in 0..3u32 {
            feedback.write_number(i + 1, 0, (i + 1) as f64).unwrap();
        }
        for (reviewee, (answer, grade)) in blocks.iter() {
            let row = *reviewee; // 1-based number lands on the 0-based row below the header
            feedback.write_string(row, 2, *answer).unwrap();
            feedback.write_number(row, 3, *grade).unwrap();
        }
        workbook.save(path).unwrap();
    }

    fn test_config(dir: &Path) -> ValidConfig {
        ValidConfig {
            master_file: dir.join("master.xlsx").to_string_lossy().to_string(),
            input_folder: dir.join("input").to_string_lossy().to_string(),
            output_folder: dir.join("output").to_string_lossy().to_string(),
            overview_sheet_name: "Overview".to_string(),
            feedback_sheet_name: "Feedback".to_string(),
            num_tasks: 1,
            columns_per_task: 2,
            reviewers_per_task: 2,
        }
    }

    fn write_fixtures(dir: &Path) {
        write_master(&dir.join("master.xlsx"));
        let alice_dir = dir.join("input").join("alice");
        fs::create_dir_all(&alice_dir).unwrap();
        write_submission(
            &alice_dir.join("alice review.xlsx"),
            &[(2, ("solid work", 4.0)), (3, ("needs tests", 3.0))],
        );
        let bob_dir = dir.join("input").join("bob");
        fs::create_dir_all(&bob_dir).unwrap();
        write_submission(&bob_dir.join("bob.xlsx"), &[(3, ("clean code", 5.0))]);
        // carol never submits anything
        fs::create_dir_all(dir.join("output")).unwrap();
    }

    #[test]
    fn excel_merge_end_to_end() {
        let dir = temp_workspace("e2e");
        write_fixtures(&dir);
        let config = test_config(&dir);

        let report = run_excel_merge(&config).unwrap();

        assert_eq!(report.num_students, 3);
        assert_eq!(report.unsubmitted, vec!["carol".to_string()]);
        assert_eq!(report.feedback_entries, 3);
        // bob left the block of his assigned reviewee 1 empty.
        assert_eq!(
            report.missing_reviews,
            vec![ReviewIssue {
                reviewer: 2,
                reviewer_username: "bob".to_string(),
                task: 0,
                reviewee: 1
            }]
        );
        assert!(report.violating_reviews.is_empty());

        let merged_path = dir.join("output").join(OUTPUT_FILE_NAME);
        let merged = io_xlsx::load_sheet(merged_path.to_string_lossy().as_ref(), "Feedback")
            .unwrap();
        // Student 2 (row 3): alice's block in the first slot.
        assert_eq!(
            merged.get(3, 3),
            Some(&CellValue::Text("solid work".to_string()))
        );
        assert_eq!(merged.get(3, 4), Some(&CellValue::Number(4.0)));
        // Student 3 (row 4): alice first, bob in the second slot.
        assert_eq!(
            merged.get(4, 3),
            Some(&CellValue::Text("needs tests".to_string()))
        );
        assert_eq!(merged.get(4, 4), Some(&CellValue::Number(3.0)));
        assert_eq!(
            merged.get(4, 5),
            Some(&CellValue::Text("clean code".to_string()))
        );
        assert_eq!(merged.get(4, 6), Some(&CellValue::Number(5.0)));
        // Student 1 (row 2) received nothing.
        assert_eq!(merged.get(2, 3), None);
        // The student columns are carried over.
        assert_eq!(merged.get(2, 1), Some(&CellValue::Number(1.0)));
        assert_eq!(merged.get(2, 2), Some(&CellValue::Text("alice".to_string())));
    }

    #[test]
    fn merge_with_reference_round_trip() {
        let dir = temp_workspace("reference");
        write_fixtures(&dir);

        let config_path = dir.join("config.json");
        let config_js = json!({
            "masterFile": dir.join("master.xlsx").to_string_lossy(),
            "inputFolder": dir.join("input").to_string_lossy(),
            "outputFolder": dir.join("output").to_string_lossy(),
            "overviewSheetName": "Overview",
            "feedbackSheetName": "Feedback",
            "numTasks": 1,
            "columnsPerTask": 2,
            "reviewersPerTask": 2,
        });
        fs::write(&config_path, serde_json::to_string_pretty(&config_js).unwrap()).unwrap();

        let summary_path = dir.join("summary.json");
        let args = Args {
            config: config_path.to_string_lossy().to_string(),
            strategy: None,
            out: Some(summary_path.to_string_lossy().to_string()),
            reference: None,
            verbose: false,
        };
        run_merge(&args).unwrap();

        // A second run must produce a summary identical to the first one.
        let args2 = Args {
            reference: Some(summary_path.to_string_lossy().to_string()),
            ..args
        };
        run_merge(&args2).unwrap();
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let dir = temp_workspace("strategy");
        let config_path = dir.join("config.json");
        let config_js = json!({
            "masterFile": "master.xlsx",
            "inputFolder": "input",
            "outputFolder": "output",
            "overviewSheetName": "Overview",
            "feedbackSheetName": "Feedback",
            "numTasks": 1,
            "columnsPerTask": 2,
            "reviewersPerTask": 2,
        });
        fs::write(&config_path, config_js.to_string()).unwrap();

        let args = Args {
            config: config_path.to_string_lossy().to_string(),
            strategy: Some("csv".to_string()),
            out: None,
            reference: None,
            verbose: false,
        };
        match run_merge(&args) {
            Err(MergeError::UnknownStrategy { strategy }) => assert_eq!(strategy, "csv"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn summary_shape() {
        let report = MergeReport {
            num_students: 2,
            unsubmitted: vec!["bob".to_string()],
            missing_reviews: vec![ReviewIssue {
                reviewer: 1,
                reviewer_username: "alice".to_string(),
                task: 0,
                reviewee: 2,
            }],
            violating_reviews: vec![],
            feedback_entries: 1,
        };
        let js = build_summary_js(&report);
        assert_eq!(js["numStudents"], json!(2));
        assert_eq!(js["unsubmitted"], json!(["bob"]));
        assert_eq!(js["missingReviews"][0]["reviewer"], json!("alice"));
        assert_eq!(js["missingReviews"][0]["task"], json!(0));
        assert_eq!(js["missingReviews"][0]["reviewee"], json!(2));
        assert_eq!(js["violatingReviews"], json!([]));
        assert_eq!(js["feedbackEntries"], json!(1));
    }
}
