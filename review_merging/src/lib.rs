mod config;
mod grid;
pub mod manual;

use log::{debug, error, info};

use std::collections::BTreeMap;

pub use crate::config::*;
pub use crate::grid::*;

/// Student numbers start at 1 and are contiguous in the overview block.
pub const FIRST_STUDENT_NUMBER: u32 = 1;

// Bounded search windows for locating the student block. A roster larger
// than these constants is not supported.
const FIRST_ROW_SEARCH_LIMIT: u32 = 50;
const BLOCK_END_SEARCH_LIMIT: u32 = 150;

/// Provides the feedback sheets of the individual submissions, keyed by the
/// reviewer's username.
pub trait SubmissionSource {
    /// The feedback sheet submitted by the given reviewer, or `None` when no
    /// usable submission exists for that username.
    fn feedback_sheet(&self, username: &str) -> Option<SheetGrid>;
}

// **** Private structures ****

struct Roster {
    // Keyed by student number; iteration order is ascending number.
    students: BTreeMap<u32, Student>,
}

/// Runs one merge pass over the given grids: derives the roster from the
/// overview sheet, reconciles every reviewer's submission against the
/// assignments, and places the valid feedback into `feedback`.
///
/// Arguments:
/// * `overview` the master overview sheet (students and assignments)
/// * `feedback` the master feedback sheet, mutated in place
/// * `submissions` the source of the per-reviewer feedback sheets
/// * `settings` the task/column geometry of the sheets
pub fn run_merge_stats(
    overview: &SheetGrid,
    feedback: &mut SheetGrid,
    submissions: &dyn SubmissionSource,
    settings: &MergeSettings,
) -> Result<MergeReport, ReconcileError> {
    let layout = settings.layout;

    let first_overview_row = find_first_marked_row(
        overview,
        layout.number_column,
        FIRST_STUDENT_NUMBER as f64,
        FIRST_ROW_SEARCH_LIMIT,
    )
    .ok_or_else(|| ReconcileError::StudentBlockNotFound {
        sheet: "overview".to_string(),
    })?;
    let last_overview_row =
        find_last_marked_row(overview, layout.number_column, BLOCK_END_SEARCH_LIMIT)
            .filter(|last| *last >= first_overview_row)
            .ok_or_else(|| ReconcileError::StudentBlockNotFound {
                sheet: "overview".to_string(),
            })?;
    let num_students = (last_overview_row - first_overview_row + 1) as usize;
    info!("Located {} students in the overview sheet", num_students);

    let mut roster = load_roster(overview, first_overview_row, num_students, settings)?;

    // The feedback sheets of the submissions share the template layout of the
    // master feedback sheet, so its first student row is the row base for all
    // of them.
    let first_feedback_row = find_first_marked_row(
        feedback,
        layout.number_column,
        FIRST_STUDENT_NUMBER as f64,
        FIRST_ROW_SEARCH_LIMIT,
    )
    .ok_or_else(|| ReconcileError::StudentBlockNotFound {
        sheet: "feedback".to_string(),
    })?;

    let unsubmitted = reconcile_submissions(&mut roster, submissions, first_feedback_row, settings);
    let feedback_entries = place_feedback(&roster, feedback, first_feedback_row, settings)?;

    let mut missing_reviews: Vec<ReviewIssue> = Vec::new();
    let mut violating_reviews: Vec<ReviewIssue> = Vec::new();
    for student in roster.students.values() {
        for r in student.missing_reviews.iter() {
            missing_reviews.push(ReviewIssue {
                reviewer: student.number,
                reviewer_username: student.username.clone(),
                task: r.task,
                reviewee: r.reviewee,
            });
        }
        for r in student.violating_reviews.iter() {
            violating_reviews.push(ReviewIssue {
                reviewer: student.number,
                reviewer_username: student.username.clone(),
                task: r.task,
                reviewee: r.reviewee,
            });
        }
    }

    Ok(MergeReport {
        num_students,
        unsubmitted,
        missing_reviews,
        violating_reviews,
        feedback_entries,
    })
}

fn load_roster(
    overview: &SheetGrid,
    first_row: u32,
    num_students: usize,
    settings: &MergeSettings,
) -> Result<Roster, ReconcileError> {
    let layout = settings.layout;
    let mut students: BTreeMap<u32, Student> = BTreeMap::new();

    for offset in 0..num_students as u32 {
        let row = first_row + offset;
        let number = read_cell_number(overview, layout.number_column, row)?;
        if number != FIRST_STUDENT_NUMBER + offset {
            return Err(ReconcileError::MalformedCell {
                cell: cell_name(layout.number_column, row),
                detail: format!(
                    "student number {} does not match its position in the block",
                    number
                ),
            });
        }
        let username = match overview.get(row, layout.username_column) {
            Some(CellValue::Text(s)) => s.clone(),
            other => {
                return Err(ReconcileError::MalformedCell {
                    cell: cell_name(layout.username_column, row),
                    detail: format!("expected a username, found {:?}", other),
                });
            }
        };

        let mut assigned_reviewees: Vec<Vec<u32>> = Vec::with_capacity(settings.num_tasks);
        for task in 0..settings.num_tasks {
            let mut reviewees: Vec<u32> = Vec::with_capacity(settings.reviewers_per_task as usize);
            for slot in 0..settings.reviewers_per_task {
                let column =
                    layout.first_review_column + task as u32 * settings.reviewers_per_task + slot;
                reviewees.push(read_cell_number(overview, column, row)?);
            }
            assigned_reviewees.push(reviewees);
        }
        debug!(
            "load_roster: student {} ({}) assignments: {:?}",
            number, username, assigned_reviewees
        );

        students.insert(
            number,
            Student {
                number,
                username,
                assigned_reviewees,
                feedback: Vec::new(),
                missing_reviews: Vec::new(),
                violating_reviews: Vec::new(),
            },
        );
    }

    // Every number referenced by an assignment must resolve to a roster key.
    for student in students.values() {
        for (task, reviewees) in student.assigned_reviewees.iter().enumerate() {
            for reviewee in reviewees.iter() {
                if !students.contains_key(reviewee) {
                    return Err(ReconcileError::UnresolvedReviewee {
                        reviewer: student.number,
                        task,
                        reviewee: *reviewee,
                    });
                }
            }
        }
    }

    Ok(Roster { students })
}

fn read_cell_number(sheet: &SheetGrid, column: u32, row: u32) -> Result<u32, ReconcileError> {
    match sheet.get(row, column) {
        Some(CellValue::Number(x)) if *x >= 1.0 && x.fract() == 0.0 => Ok(*x as u32),
        other => Err(ReconcileError::MalformedCell {
            cell: cell_name(column, row),
            detail: format!("expected a student number, found {:?}", other),
        }),
    }
}

/// Classifies every feedback block of every submitted sheet and accumulates
/// the outcome into the roster. Returns the usernames of the reviewers
/// without a usable submission.
fn reconcile_submissions(
    roster: &mut Roster,
    submissions: &dyn SubmissionSource,
    first_feedback_row: u32,
    settings: &MergeSettings,
) -> Vec<String> {
    let layout = settings.layout;
    let reviewer_numbers: Vec<u32> = roster.students.keys().copied().collect();
    let num_students = reviewer_numbers.len() as u32;
    let mut unsubmitted: Vec<String> = Vec::new();

    for reviewer in reviewer_numbers {
        let (username, assignments) = {
            let s = &roster.students[&reviewer];
            (s.username.clone(), s.assigned_reviewees.clone())
        };
        let sheet = match submissions.feedback_sheet(&username) {
            Some(s) => s,
            None => {
                info!("Student ({}) did not submit a review", username);
                unsubmitted.push(username);
                continue;
            }
        };

        // The scan covers every possible reviewee row, not just the assigned
        // ones: the longer of the roster block and the sheet's own numbered
        // block, so blocks filled beyond the roster are still caught.
        let sheet_len =
            match find_last_marked_row(&sheet, layout.number_column, BLOCK_END_SEARCH_LIMIT) {
                Some(last) if last >= first_feedback_row => last - first_feedback_row + 1,
                _ => 0,
            };
        let scan_count = u32::max(num_students, sheet_len);
        debug!(
            "reconcile: reviewer {} ({}): scanning {} reviewee rows",
            reviewer, username, scan_count
        );

        let mut valid: Vec<(usize, u32, Vec<Option<CellValue>>)> = Vec::new();
        let mut missing: Vec<ReviewRef> = Vec::new();
        let mut violating: Vec<ReviewRef> = Vec::new();

        for task in 0..settings.num_tasks {
            let start_column = layout.first_review_column + task as u32 * settings.columns_per_task;
            for reviewee in FIRST_STUDENT_NUMBER..FIRST_STUDENT_NUMBER + scan_count {
                let row = first_feedback_row + (reviewee - FIRST_STUDENT_NUMBER);
                let block = read_feedback_block(&sheet, row, start_column, settings);
                let filled = block.iter().any(|v| v.is_some());
                let assigned = assignments
                    .get(task)
                    .map_or(false, |reviewees| reviewees.contains(&reviewee));

                match (assigned, filled) {
                    (true, true) => valid.push((task, reviewee, block)),
                    (true, false) => {
                        error!(
                            "Reviewer {} did not fill in the review of student {} for task {} (block at {})",
                            username,
                            reviewee,
                            task,
                            cell_name(start_column, row)
                        );
                        missing.push(ReviewRef { task, reviewee });
                    }
                    (false, true) => {
                        error!(
                            "Reviewer {} submitted a review outside the assignment: student {} for task {} (block at {})",
                            username,
                            reviewee,
                            task,
                            cell_name(start_column, row)
                        );
                        violating.push(ReviewRef { task, reviewee });
                    }
                    (false, false) => {}
                }
            }
        }

        {
            let s = roster
                .students
                .get_mut(&reviewer)
                .expect("reviewer numbers come from the roster");
            s.missing_reviews.extend(missing);
            s.violating_reviews.extend(violating);
        }
        for (task, reviewee, values) in valid {
            let target = roster
                .students
                .get_mut(&reviewee)
                .expect("assignments are validated against the roster");
            target.feedback.push(TaskFeedback { task, values });
        }
    }

    unsubmitted
}

fn read_feedback_block(
    sheet: &SheetGrid,
    row: u32,
    start_column: u32,
    settings: &MergeSettings,
) -> Vec<Option<CellValue>> {
    (0..settings.columns_per_task)
        .map(|k| sheet.get(row, start_column + k).cloned())
        .collect()
}

/// Places every accumulated feedback block into the master feedback sheet,
/// probing for the first unoccupied reviewer slot of the task. Returns the
/// number of blocks written.
fn place_feedback(
    roster: &Roster,
    feedback: &mut SheetGrid,
    first_feedback_row: u32,
    settings: &MergeSettings,
) -> Result<usize, ReconcileError> {
    let layout = settings.layout;
    let mut written = 0usize;

    for (number, student) in roster.students.iter() {
        let row = first_feedback_row + (number - FIRST_STUDENT_NUMBER);
        for entry in student.feedback.iter() {
            let base_column = layout.first_review_column
                + entry.task as u32 * settings.reviewers_per_task * settings.columns_per_task;
            let mut free_column = None;
            for slot in 0..settings.reviewers_per_task {
                let column = base_column + slot * settings.columns_per_task;
                if !slot_occupied(feedback, row, column, settings.columns_per_task) {
                    free_column = Some(column);
                    break;
                }
            }
            let column = free_column.ok_or(ReconcileError::SlotOverflow {
                student: *number,
                task: entry.task,
            })?;
            debug!(
                "place_feedback: student {} task {} -> slot at {}",
                number,
                entry.task,
                cell_name(column, row)
            );
            for (k, value) in entry.values.iter().enumerate() {
                if let Some(v) = value {
                    feedback.set(row, column + k as u32, v.clone());
                }
            }
            written += 1;
        }
    }

    Ok(written)
}

fn slot_occupied(feedback: &SheetGrid, row: u32, column: u32, columns_per_task: u32) -> bool {
    (0..columns_per_task).any(|k| feedback.get(row, column + k).is_some())
}
