use crate::core::time::parse_submission_time;
use crate::errors::ModelError;
use crate::model::Submission;
use crate::schemas::SubmissionSnapshot;

/// Builds a row from its wire shape, normalising the coupled flags.
pub(super) fn submission_from_snapshot(
    snapshot: SubmissionSnapshot,
    max_score: f64,
) -> Result<Submission, ModelError> {
    let SubmissionSnapshot {
        module_id,
        fullname,
        username,
        uploaded,
        annotated,
        submitted,
        submission_time,
        upload_allowed,
        score,
        comment,
        approved,
        published,
        may_grade,
        needs_approval,
        max_score: _,
        graded,
    } = snapshot;

    let (score, comment, approved) = match graded {
        Some(graded) if score.is_none() => {
            (Some(graded.score), graded.comment.or(comment), approved.or(Some(true)))
        }
        _ => (score, comment, approved),
    };

    if let Some(score) = score {
        if !score.is_finite() || score < 0.0 || score > max_score {
            return Err(ModelError::MalformedSnapshot(format!(
                "score {score} for module {module_id} is outside 0..={max_score}"
            )));
        }
    }

    let mut upload_allowed = upload_allowed.unwrap_or(!submitted);
    if submitted && upload_allowed {
        tracing::warn!(module_id = %module_id, "Snapshot allows uploads on a submitted row");
        upload_allowed = false;
    }

    let graded = score.is_some();

    Ok(Submission {
        module_id,
        full_name: fullname,
        username,
        uploaded,
        annotated,
        submitted,
        submitted_on: submission_time.as_deref().and_then(parse_submission_time),
        upload_allowed,
        score,
        comment: comment.unwrap_or_default(),
        approved: graded && approved.unwrap_or(false),
        published: graded && published.unwrap_or(false),
        may_grade: may_grade.unwrap_or(false),
        needs_approval: graded && needs_approval.unwrap_or(false),
    })
}

pub(super) fn validate_max_score(max_score: f64) -> Result<f64, ModelError> {
    if !max_score.is_finite() || max_score < 0.0 {
        return Err(ModelError::MalformedSnapshot(format!("invalid max_score {max_score}")));
    }
    Ok(max_score)
}
