//! Run arguments: `-p:key=value` parameters and the `-s:name` stop marker.

use crate::error::{DeliveryError, Result};
use crate::tokens::ParameterSet;

const PARAM_PREFIX: &str = "-p:";
const STOP_PREFIX: &str = "-s:";

/// Parsed arguments for one engine run. Order of arguments is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// User-supplied token values (last write wins per key).
    pub parameters: ParameterSet,
    /// Run only scripts strictly before this one.
    pub stop_before: Option<String>,
}

impl RunArgs {
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut parsed = RunArgs::default();

        for arg in args.iter().map(AsRef::as_ref) {
            if let Some(pair) = strip_prefix_ignore_case(arg, PARAM_PREFIX) {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| DeliveryError::InvalidArgument(arg.to_string()))?;
                if key.is_empty() {
                    return Err(DeliveryError::InvalidArgument(arg.to_string()));
                }
                parsed.parameters.insert(key, value);
            } else if let Some(name) = strip_prefix_ignore_case(arg, STOP_PREFIX) {
                if name.is_empty() {
                    return Err(DeliveryError::InvalidArgument(arg.to_string()));
                }
                if let Some(first) = parsed.stop_before.take() {
                    return Err(DeliveryError::DuplicateStopMarker {
                        first,
                        second: name.to_string(),
                    });
                }
                parsed.stop_before = Some(name.to_string());
            } else {
                return Err(DeliveryError::InvalidArgument(arg.to_string()));
            }
        }

        Ok(parsed)
    }
}

fn strip_prefix_ignore_case<'a>(arg: &'a str, prefix: &str) -> Option<&'a str> {
    let head = arg.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &arg[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameters_and_stop_marker() {
        let args = RunArgs::parse(&["-p:bar=baz", "-s:002.delivery", "-p:url=a=b"]).unwrap();
        assert_eq!(args.parameters.get("bar"), Some("baz"));
        assert_eq!(args.parameters.get("url"), Some("a=b"));
        assert_eq!(args.stop_before.as_deref(), Some("002.delivery"));
    }

    #[test]
    fn last_parameter_wins() {
        let args = RunArgs::parse(&["-p:k=1", "-p:k=2"]).unwrap();
        assert_eq!(args.parameters.get("k"), Some("2"));
    }

    #[test]
    fn empty_value_is_allowed() {
        let args = RunArgs::parse(&["-p:k="]).unwrap();
        assert_eq!(args.parameters.get("k"), Some(""));
    }

    #[test]
    fn prefixes_are_case_insensitive() {
        let args = RunArgs::parse(&["-P:k=v", "-S:x.delivery"]).unwrap();
        assert_eq!(args.parameters.get("k"), Some("v"));
        assert!(args.stop_before.is_some());
    }

    #[test]
    fn rejects_malformed_and_unknown() {
        assert!(RunArgs::parse(&["-p:novalue"]).is_err());
        assert!(RunArgs::parse(&["-p:=v"]).is_err());
        assert!(RunArgs::parse(&["-s:"]).is_err());
        assert!(RunArgs::parse(&["--force"]).is_err());
    }

    #[test]
    fn rejects_second_stop_marker() {
        let err = RunArgs::parse(&["-s:a", "-s:b"]).unwrap_err();
        assert!(matches!(err, DeliveryError::DuplicateStopMarker { .. }));
    }

    #[test]
    fn no_args_is_empty() {
        let args = RunArgs::parse::<&str>(&[]).unwrap();
        assert!(args.parameters.is_empty());
        assert!(args.stop_before.is_none());
    }
}
