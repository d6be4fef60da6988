//! Line protocol for the interactive CLI.
//!
//! ```text
//! move <lat> <lng>
//! zoom <level>
//! touch marker:<id> | cluster:<id>
//! refresh
//! push [json payload]
//! quit
//! ```

use anyhow::{bail, Context, Result};

use nearcast_map::PopupKey;

use crate::driver::ViewerCommand;
use crate::push::PushSignal;

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Viewer(ViewerCommand),
    Push(PushSignal),
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Input>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let args: Vec<&str> = rest.split_whitespace().collect();

    let input = match verb.to_ascii_lowercase().as_str() {
        "move" => {
            let [lat, lng] = args.as_slice() else {
                bail!("usage: move <lat> <lng>");
            };
            Input::Viewer(ViewerCommand::Move {
                lat: parse_f64(lat, "lat")?,
                lng: parse_f64(lng, "lng")?,
            })
        }
        "zoom" => {
            let [zoom] = args.as_slice() else {
                bail!("usage: zoom <level>");
            };
            Input::Viewer(ViewerCommand::Zoom(parse_f64(zoom, "zoom")?))
        }
        "touch" => {
            let [key] = args.as_slice() else {
                bail!("usage: touch marker:<id> | cluster:<id>");
            };
            let key: PopupKey = key.parse()?;
            Input::Viewer(ViewerCommand::Touch(key))
        }
        "refresh" => Input::Viewer(ViewerCommand::Refresh),
        "push" => {
            let payload = if rest.trim().is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_str(rest.trim()).context("push payload must be JSON")?
            };
            Input::Push(PushSignal::PostCreated { payload })
        }
        "quit" | "exit" => Input::Viewer(ViewerCommand::Shutdown),
        other => bail!("unknown command: {other}"),
    };
    Ok(Some(input))
}

fn parse_f64(raw: &str, name: &str) -> Result<f64> {
    raw.parse::<f64>()
        .with_context(|| format!("{name} is not a number: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_viewer_commands() {
        assert_eq!(
            parse_line("move 35.68 139.76").unwrap(),
            Some(Input::Viewer(ViewerCommand::Move { lat: 35.68, lng: 139.76 }))
        );
        assert_eq!(
            parse_line("  zoom 14.5 ").unwrap(),
            Some(Input::Viewer(ViewerCommand::Zoom(14.5)))
        );
        assert_eq!(
            parse_line("touch cluster:3").unwrap(),
            Some(Input::Viewer(ViewerCommand::Touch(PopupKey::Cluster(3))))
        );
        assert_eq!(parse_line("QUIT").unwrap(), Some(Input::Viewer(ViewerCommand::Shutdown)));
    }

    #[test]
    fn push_payload_is_optional_json() {
        assert_eq!(
            parse_line("push").unwrap(),
            Some(Input::Push(PushSignal::PostCreated { payload: serde_json::Value::Null }))
        );
        assert_eq!(
            parse_line(r#"push {"id": 9}"#).unwrap(),
            Some(Input::Push(PushSignal::PostCreated { payload: json!({"id": 9}) }))
        );
        assert!(parse_line("push {not json").is_err());
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   # a comment").unwrap(), None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_line("move 35.68").is_err());
        assert!(parse_line("move north 139.7").is_err());
        assert!(parse_line("touch pin:1").is_err());
        assert!(parse_line("teleport").is_err());
    }
}
