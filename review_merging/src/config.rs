// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

use crate::grid::CellValue;

/// Fixed column positions shared by the overview sheet, the feedback sheets
/// of the individual submissions, and the merged output sheet.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct SheetLayout {
    /// Column holding the student number.
    pub number_column: u32,
    /// Column holding the student username.
    pub username_column: u32,
    /// First column of review data (assignments or feedback blocks).
    pub first_review_column: u32,
}

impl SheetLayout {
    pub const DEFAULT: SheetLayout = SheetLayout {
        number_column: 1,
        username_column: 2,
        first_review_column: 3,
    };
}

/// The geometry of one merge run.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct MergeSettings {
    /// Number of reviewable tasks.
    pub num_tasks: usize,
    /// Width of one feedback block (answer cells per task).
    pub columns_per_task: u32,
    /// Number of reviewers assigned to each student per task. This is also
    /// the number of feedback slots reserved per task in the output sheet.
    pub reviewers_per_task: u32,
    pub layout: SheetLayout,
}

/// One feedback block received by a student: the answers of a single
/// reviewer about a single task.
#[derive(PartialEq, Debug, Clone)]
pub struct TaskFeedback {
    pub task: usize,
    /// Exactly `columns_per_task` cells; `None` marks an empty answer cell.
    pub values: Vec<Option<CellValue>>,
}

/// A (task, reviewee) pair recorded against a reviewer.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct ReviewRef {
    pub task: usize,
    pub reviewee: u32,
}

/// A member of the roster, acting both as a reviewer (assignments,
/// violations) and as a reviewee (accumulated feedback).
#[derive(PartialEq, Debug, Clone)]
pub struct Student {
    pub number: u32,
    pub username: String,
    /// Assigned reviewee numbers, indexed by task. Each entry holds exactly
    /// `reviewers_per_task` numbers, in overview column order.
    pub assigned_reviewees: Vec<Vec<u32>>,
    /// Feedback received, one entry per reviewer who validly reviewed this
    /// student for that task. Append-only during reconciliation.
    pub feedback: Vec<TaskFeedback>,
    /// Reviews this student was assigned but did not fill in.
    pub missing_reviews: Vec<ReviewRef>,
    /// Reviews this student filled in outside the assignment.
    pub violating_reviews: Vec<ReviewRef>,
}

// ******** Output data structures *********

/// A reported review anomaly, with the reviewer spelled out.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReviewIssue {
    pub reviewer: u32,
    pub reviewer_username: String,
    pub task: usize,
    pub reviewee: u32,
}

/// The outcome of one merge run.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct MergeReport {
    pub num_students: usize,
    /// Usernames of reviewers with no usable submission.
    pub unsubmitted: Vec<String>,
    pub missing_reviews: Vec<ReviewIssue>,
    pub violating_reviews: Vec<ReviewIssue>,
    /// Feedback blocks placed into the output sheet.
    pub feedback_entries: usize,
}

/// Errors that prevent the reconciliation from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ReconcileError {
    /// The student block could not be located in the named sheet within the
    /// bounded search windows.
    StudentBlockNotFound { sheet: String },
    /// A cell of the overview sheet does not hold what the layout requires.
    MalformedCell { cell: String, detail: String },
    /// An assignment references a student number absent from the roster.
    UnresolvedReviewee {
        reviewer: u32,
        task: usize,
        reviewee: u32,
    },
    /// More valid feedback arrived for one (student, task) than there are
    /// reviewer slots in the output sheet.
    SlotOverflow { student: u32, task: usize },
}

impl Error for ReconcileError {}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::StudentBlockNotFound { sheet } => {
                write!(f, "no student block found in sheet '{}'", sheet)
            }
            ReconcileError::MalformedCell { cell, detail } => {
                write!(f, "malformed overview cell {}: {}", cell, detail)
            }
            ReconcileError::UnresolvedReviewee {
                reviewer,
                task,
                reviewee,
            } => write!(
                f,
                "student {} is assigned to review student {} for task {}, but that number is not in the roster",
                reviewer, reviewee, task
            ),
            ReconcileError::SlotOverflow { student, task } => write!(
                f,
                "more feedback entries than reviewer slots for student {} in task {}",
                student, task
            ),
        }
    }
}
