/*!

This is the long-form manual for `review_merging` and `revmerge`.

## Sheet layout

All sheets share the same fixed column layout:
* column A: the student number (1-based, contiguous)
* column B: the student username
* column C onwards: review data

The engine locates the student block by scanning column A for the number `1`
(the start marker) and for the first empty cell (one past the end of the
block). Both searches run over a bounded window, so very large rosters are
not supported.

### Overview sheet

One row per student. Starting at column C, each task owns a group of
`reviewers_per_task` columns holding the numbers of the students this row's
student must review for that task.

### Feedback sheets

One row per reviewee, aligned with the overview block: the row of reviewee
`n` is the first feedback row plus `n - 1`. Starting at column C, each task
owns a group of `columns_per_task` answer cells. A block counts as filled as
soon as any one of its cells is non-empty.

Each reviewer submits a copy of the feedback sheet with their answers filled
in. The merged output sheet reserves `reviewers_per_task` adjacent blocks per
task, one per reviewer, assigned in ascending reviewer order.

## Classification rules

For every submitted sheet, every (task, possible reviewee) block is
classified:
* assigned and filled: the block is appended to the reviewee's feedback
* assigned and empty: a missing review is recorded against the reviewer
* not assigned and filled: a violating review is recorded against the
  reviewer
* not assigned and empty: nothing

A reviewer with no usable submission is skipped entirely and contributes no
entries at all.

## Fatal conditions

The merge aborts without writing any output when the overview data is
malformed (no student block, broken numbering, an assignment referencing a
number outside the roster) or when more valid feedback arrives for one
(student, task) than there are reviewer slots.

*/
