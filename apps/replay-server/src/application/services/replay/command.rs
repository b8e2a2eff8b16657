//! Control commands and their request/response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ReplayError;

/// Raw control request as received from the API layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Command name.
    pub command: String,
    /// Playback speed for `speed`.
    #[serde(default)]
    pub speed: Option<f64>,
    /// Offset in seconds for `skip` and `go_back`.
    #[serde(default)]
    pub n_seconds: Option<f64>,
}

/// A validated control command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    /// Suspend playback.
    Pause,
    /// Continue playback, relaunching a completed replay.
    Resume,
    /// Stop and discard the replay.
    Stop,
    /// Change playback speed.
    Speed(f64),
    /// Seek forward by seconds.
    Skip(f64),
    /// Seek backward by seconds.
    GoBack(f64),
}

impl ControlCommand {
    /// Wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Speed(_) => "speed",
            Self::Skip(_) => "skip",
            Self::GoBack(_) => "go_back",
        }
    }
}

impl TryFrom<&ControlRequest> for ControlCommand {
    type Error = ReplayError;

    fn try_from(request: &ControlRequest) -> Result<Self, Self::Error> {
        match request.command.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            "speed" => {
                let speed = request.speed.ok_or(ReplayError::MissingParameter {
                    command: "speed",
                    parameter: "speed",
                })?;
                if !speed.is_finite() {
                    return Err(ReplayError::InvalidParameter {
                        parameter: "speed",
                        reason: "must be a finite number".to_string(),
                    });
                }
                Ok(Self::Speed(speed))
            }
            "skip" => offset(request, "skip").map(Self::Skip),
            "go_back" => offset(request, "go_back").map(Self::GoBack),
            _ => Err(ReplayError::InvalidCommand {
                command: request.command.clone(),
            }),
        }
    }
}

fn offset(request: &ControlRequest, command: &'static str) -> Result<f64, ReplayError> {
    let seconds = request.n_seconds.ok_or(ReplayError::MissingParameter {
        command,
        parameter: "n_seconds",
    })?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ReplayError::InvalidParameter {
            parameter: "n_seconds",
            reason: format!("must be a positive number of seconds, got {seconds}"),
        });
    }
    Ok(seconds)
}

/// Response to a successful control command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Always `success`.
    pub status: String,
    /// Command that was applied.
    pub command: String,
    /// Speed in effect after a `speed` command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Replay position after a seek.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<DateTime<Utc>>,
}

impl ControlResponse {
    /// Plain success for `command`.
    #[must_use]
    pub fn success(command: ControlCommand) -> Self {
        Self {
            status: "success".to_string(),
            command: command.name().to_string(),
            speed: None,
            current_time: None,
        }
    }

    /// Attach the applied speed.
    #[must_use]
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Attach the position reached by a seek.
    #[must_use]
    pub fn with_position(mut self, at: DateTime<Utc>) -> Self {
        self.current_time = Some(at);
        self
    }
}

/// Response to a successful session selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectSessionResponse {
    /// Always `success`.
    pub status: String,
    /// Human-readable outcome.
    pub message: String,
    /// Selected session.
    pub session_id: String,
}

impl SelectSessionResponse {
    /// Replay of `session_id` has started.
    #[must_use]
    pub fn started(session_id: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: "Replay started".to_string(),
            session_id: session_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn request(command: &str, speed: Option<f64>, n_seconds: Option<f64>) -> ControlRequest {
        ControlRequest {
            command: command.to_string(),
            speed,
            n_seconds,
        }
    }

    #[test_case("pause", ControlCommand::Pause ; "pause")]
    #[test_case("resume", ControlCommand::Resume ; "resume")]
    #[test_case("STOP", ControlCommand::Stop ; "stop is case insensitive")]
    fn parses_bare_commands(name: &str, expected: ControlCommand) {
        assert_eq!(ControlCommand::try_from(&request(name, None, None)).unwrap(), expected);
    }

    #[test]
    fn parses_parameterised_commands() {
        assert_eq!(
            ControlCommand::try_from(&request("speed", Some(2.0), None)).unwrap(),
            ControlCommand::Speed(2.0)
        );
        assert_eq!(
            ControlCommand::try_from(&request("skip", None, Some(30.0))).unwrap(),
            ControlCommand::Skip(30.0)
        );
        assert_eq!(
            ControlCommand::try_from(&request("go_back", None, Some(5.0))).unwrap(),
            ControlCommand::GoBack(5.0)
        );
    }

    #[test]
    fn rejects_unknown_command() {
        let error = ControlCommand::try_from(&request("rewind", None, None)).unwrap_err();
        assert!(matches!(error, ReplayError::InvalidCommand { command } if command == "rewind"));
    }

    #[test_case("speed", "speed" ; "speed needs speed")]
    #[test_case("skip", "n_seconds" ; "skip needs seconds")]
    #[test_case("go_back", "n_seconds" ; "go back needs seconds")]
    fn rejects_missing_parameter(name: &str, missing: &str) {
        let error = ControlCommand::try_from(&request(name, None, None)).unwrap_err();
        assert!(matches!(error, ReplayError::MissingParameter { parameter, .. } if parameter == missing));
    }

    #[test_case(0.0 ; "zero")]
    #[test_case(-5.0 ; "negative")]
    #[test_case(f64::NAN ; "nan")]
    fn rejects_non_positive_offsets(seconds: f64) {
        let error = ControlCommand::try_from(&request("skip", None, Some(seconds))).unwrap_err();
        assert!(matches!(error, ReplayError::InvalidParameter { parameter: "n_seconds", .. }));
    }

    #[test]
    fn rejects_infinite_speed() {
        let error = ControlCommand::try_from(&request("speed", Some(f64::INFINITY), None)).unwrap_err();
        assert!(matches!(error, ReplayError::InvalidParameter { parameter: "speed", .. }));
    }

    #[test]
    fn response_omits_empty_fields() {
        let body = serde_json::to_value(ControlResponse::success(ControlCommand::Pause)).unwrap();
        assert_eq!(body, serde_json::json!({ "status": "success", "command": "pause" }));
    }
}
