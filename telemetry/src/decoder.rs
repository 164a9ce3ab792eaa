//! Frame decoding and validation.
//!
//! A payload either becomes a complete [`Frame`] or a [`DecodeError`];
//! nothing partially decoded ever reaches the run view.

use shared_types::Frame;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed frame JSON: {0}")]
    Json(String),

    #[error("Invalid frame: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Json(e.to_string())
    }
}

pub fn decode_frame(raw: &str) -> Result<Frame, DecodeError> {
    let mut frame: Frame = serde_json::from_str(raw)?;
    validate(&frame)?;
    normalize_labels(&mut frame);
    Ok(frame)
}

fn validate(frame: &Frame) -> Result<(), DecodeError> {
    let pages_per_sec = frame.throughput.pages_per_sec;
    if !pages_per_sec.is_finite() || pages_per_sec < 0.0 {
        return Err(DecodeError::Invalid(format!(
            "throughput.pages_per_sec out of range: {pages_per_sec}"
        )));
    }

    for (index, host) in frame.hosts.iter().enumerate() {
        if host.host.is_empty() {
            return Err(DecodeError::Invalid(format!("hosts[{index}].host is empty")));
        }
        check_rate(index, "error_rate", host.error_rate)?;
        check_rate(index, "reuse_rate", host.reuse_rate)?;
    }

    for (index, error) in frame.errors.iter().enumerate() {
        if error.class.is_empty() {
            return Err(DecodeError::Invalid(format!("errors[{index}].class is empty")));
        }
    }

    if let Some(index) = frame.graph_delta.nodes.iter().position(String::is_empty) {
        return Err(DecodeError::Invalid(format!(
            "graph_delta.nodes[{index}] is empty"
        )));
    }
    if let Some(index) = frame
        .graph_delta
        .edges
        .iter()
        .position(|edge| edge.src.is_empty() || edge.dst.is_empty())
    {
        return Err(DecodeError::Invalid(format!(
            "graph_delta.edges[{index}] has an empty endpoint"
        )));
    }

    Ok(())
}

fn check_rate(index: usize, field: &str, value: f64) -> Result<(), DecodeError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DecodeError::Invalid(format!(
            "hosts[{index}].{field} outside [0, 1]: {value}"
        )))
    }
}

/// The producer writes `""` for labels it has no value for.
fn normalize_labels(frame: &mut Frame) {
    for host in &mut frame.hosts {
        if host.robots_state.as_deref() == Some("") {
            host.robots_state = None;
        }
        if host.circuit_state.as_deref() == Some("") {
            host.circuit_state = None;
        }
    }
}
