//! Turns a loosely typed `DeliveryRequest` into `DeliveryOptions`.
//!
//! No async and no IO. A request that fails here never reaches a collaborator.

use catalog::model::{Difficulty, QuestionType, Strategy};

use crate::error::DeliveryError;
use crate::types::{DeliveryOptions, DeliveryRequest, MAX_QUESTION_LIMIT, SessionType};

/// Validate `req`, enforcing:
///   - non-empty user id
///   - difficulty in {easy, medium, hard}
///   - 0 < question_limit <= 100
///   - session type in the six known values
///   - topic filter, when given, is non-empty and has no blank tags
///   - strategy override, when given, names a known strategy
pub fn validate_request(req: &DeliveryRequest) -> Result<DeliveryOptions, DeliveryError> {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(invalid("user_id must not be empty"));
    }

    let difficulty: Difficulty = req
        .difficulty
        .parse()
        .map_err(|_| invalid(format!("unknown difficulty '{}'", req.difficulty)))?;

    if req.question_limit <= 0 || req.question_limit > MAX_QUESTION_LIMIT as i64 {
        return Err(invalid(format!(
            "question_limit must be between 1 and {}, got {}",
            MAX_QUESTION_LIMIT, req.question_limit
        )));
    }

    let session_type: SessionType = req
        .session_type
        .parse()
        .map_err(|_| invalid(format!("unknown session type '{}'", req.session_type)))?;

    let topic_filter = match &req.topic_filter {
        None => None,
        Some(topics) if topics.is_empty() => {
            return Err(invalid("topic_filter must not be empty when provided"));
        }
        Some(topics) => {
            let mut out: Vec<QuestionType> = Vec::with_capacity(topics.len());
            for t in topics {
                let t = t.trim();
                if t.is_empty() {
                    return Err(invalid("topic_filter contains a blank topic"));
                }
                let qt = QuestionType::new(t);
                if !out.contains(&qt) {
                    out.push(qt);
                }
            }
            Some(out)
        }
    };

    let strategy_override = match &req.strategy {
        None => None,
        Some(s) => Some(
            s.parse::<Strategy>()
                .map_err(|_| invalid(format!("unknown strategy '{}'", s)))?,
        ),
    };

    let mut exclude_ids = req.exclude_ids.clone().unwrap_or_default();
    exclude_ids.sort_unstable();
    exclude_ids.dedup();

    Ok(DeliveryOptions {
        user_id: user_id.to_string(),
        difficulty,
        session_type,
        question_limit: req.question_limit as usize,
        topic_filter,
        exclude_ids,
        strategy_override,
    })
}

fn invalid(msg: impl Into<String>) -> DeliveryError {
    DeliveryError::Validation(msg.into())
}
