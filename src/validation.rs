use crate::errors::ModelError;

/// Parses a grade typed into the grade-entry form. The numeric check runs
/// first, then the sign, then the upper bound.
pub fn parse_grade(raw: &str, max_score: f64) -> Result<f64, ModelError> {
    let score = raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|score| score.is_finite())
        .ok_or(ModelError::GradeNotNumeric)?;

    if score < 0.0 {
        return Err(ModelError::GradeNegative);
    }
    if score > max_score {
        return Err(ModelError::GradeExceedsMax { max_score });
    }
    Ok(score)
}
