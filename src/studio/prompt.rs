//! Text commands for the interactive session prompt.
//!
//! ```text
//! arm | disarm | rec | stop
//! set <parameter> <value>        e.g. `set eqLow 6`
//! export [wav|mp3]
//! pitch <semitones> | autotune <strength>
//! save <path> | quit
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::audio::StreamInfo;
use crate::backend::{ExportFormat, UnknownFormat};
use crate::graph::{ParamError, ParameterValue};

use super::runner::StudioCommand;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PromptError {
    #[error("unknown command `{0}` (try `help`)")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("no input device is open")]
    NoInput,

    #[error(transparent)]
    Parameter(#[from] ParamError),

    #[error(transparent)]
    Format(#[from] UnknownFormat),

    #[error("invalid number `{0}`")]
    Number(String),
}

pub const HELP: &str = "\
arm                     open the input and build the effects chain
disarm                  release the input
rec                     start a take
stop                    finish the take and save it to the server
set <param> <value>     gain, eqLow, eqHigh, reverbMix, delayTime, compThresh, delayMix
export [wav|mp3]        convert the current take and download it
pitch <semitones>       pitch-shift the current take
autotune <strength>     pitch-correct the current take
save <path>             write the last take to a local file
quit                    finish pending requests and exit";

/// Parse one prompt line.  Blank lines and `help` yield `Ok(None)`.
///
/// `stream` is the open input, needed by `arm`.
pub fn parse_line(
    line: &str,
    stream: Option<StreamInfo>,
) -> Result<Option<StudioCommand>, PromptError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let cmd = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("help" | "?", _) => return Ok(None),
        ("arm", []) => StudioCommand::Arm(stream.ok_or(PromptError::NoInput)?),
        ("disarm", []) => StudioCommand::Disarm,
        ("rec" | "record" | "start", []) => StudioCommand::Start,
        ("stop", []) => StudioCommand::Stop,
        ("set", [id, value]) => StudioCommand::SetParameter(ParameterValue::parse(id, value)?),
        ("set", _) => return Err(PromptError::Usage("set <parameter> <value>")),
        ("export", []) => StudioCommand::Export(ExportFormat::default()),
        ("export", [format]) => StudioCommand::Export(format.parse()?),
        ("pitch", [amount]) => StudioCommand::PitchShift {
            amount: number(amount)?,
            correct: false,
        },
        ("pitch", _) => return Err(PromptError::Usage("pitch <semitones>")),
        ("autotune", [strength]) => StudioCommand::Autotune(number(strength)?),
        ("autotune", _) => return Err(PromptError::Usage("autotune <strength>")),
        ("save", [path]) => StudioCommand::SaveLocal(PathBuf::from(*path)),
        ("save", _) => return Err(PromptError::Usage("save <path>")),
        ("quit" | "exit", []) => StudioCommand::Shutdown,
        _ => return Err(PromptError::UnknownCommand(line.trim().to_string())),
    };
    Ok(Some(cmd))
}

fn number(s: &str) -> Result<f32, PromptError> {
    s.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PromptError::Number(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ParameterId;

    const STREAM: StreamInfo = StreamInfo {
        sample_rate: 44_100,
        channels: 1,
    };

    #[test]
    fn parses_transport_verbs() {
        assert_eq!(
            parse_line("arm", Some(STREAM)).unwrap(),
            Some(StudioCommand::Arm(STREAM))
        );
        assert_eq!(parse_line("  REC ", None).unwrap(), Some(StudioCommand::Start));
        assert_eq!(parse_line("quit", None).unwrap(), Some(StudioCommand::Shutdown));
        assert_eq!(parse_line("", None).unwrap(), None);
    }

    #[test]
    fn arm_needs_an_input() {
        assert_eq!(parse_line("arm", None), Err(PromptError::NoInput));
    }

    #[test]
    fn parses_parameters() {
        let cmd = parse_line("set delayTime 250", None).unwrap().unwrap();
        assert_eq!(
            cmd,
            StudioCommand::SetParameter(ParameterValue::new(ParameterId::DelayTime, 250.0).unwrap())
        );
        assert!(matches!(
            parse_line("set wah 1", None),
            Err(PromptError::Parameter(ParamError::UnknownParameter(_)))
        ));
        assert_eq!(
            parse_line("set gain", None),
            Err(PromptError::Usage("set <parameter> <value>"))
        );
    }

    #[test]
    fn parses_post_processing() {
        assert_eq!(
            parse_line("export", None).unwrap(),
            Some(StudioCommand::Export(ExportFormat::Wav))
        );
        assert_eq!(
            parse_line("export mp3", None).unwrap(),
            Some(StudioCommand::Export(ExportFormat::Mp3))
        );
        assert!(matches!(parse_line("export ogg", None), Err(PromptError::Format(_))));
        assert_eq!(
            parse_line("pitch -3", None).unwrap(),
            Some(StudioCommand::PitchShift {
                amount: -3.0,
                correct: false
            })
        );
        assert_eq!(
            parse_line("autotune 0.8", None).unwrap(),
            Some(StudioCommand::Autotune(0.8))
        );
        assert_eq!(
            parse_line("pitch up", None),
            Err(PromptError::Number("up".into()))
        );
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert_eq!(
            parse_line("dance now", None),
            Err(PromptError::UnknownCommand("dance now".into()))
        );
    }
}
