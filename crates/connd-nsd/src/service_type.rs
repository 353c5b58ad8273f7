//! Service type normalisation and DNS name unescaping.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, warn};

use crate::NSD_TARGET;

const LOCAL_DOMAIN_SUFFIX: &str = ".local.";

static SERVICE_TYPE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(
        r"^(_[a-zA-Z0-9_-]{1,61}[a-zA-Z0-9]\.)?(_[a-zA-Z0-9_-]{1,61}[a-zA-Z0-9]\._(?:tcp|udp))$",
    )
});

/// Canonical `.local` query name for a client supplied service type.
///
/// `_http._tcp` becomes `_http._tcp.local` and the subtype form
/// `_printer._http._tcp` becomes `_printer._sub._http._tcp.local`.
/// Returns `None` when the type is malformed.
#[must_use]
pub fn normalize_service_type(service_type: &str) -> Option<String> {
    let pattern = match SERVICE_TYPE.as_ref() {
        Ok(pattern) => pattern,
        Err(cause) => {
            error!(target: NSD_TARGET, %cause, "service type pattern failed to compile");
            return None;
        }
    };
    let captures = pattern.captures(service_type)?;
    let base = captures.get(2)?.as_str();
    Some(match captures.get(1) {
        Some(subtype) => format!("{}_sub.{base}.local", subtype.as_str()),
        None => format!("{service_type}.local"),
    })
}

/// Splits a daemon supplied full name such as `My\.Printer._ipp._tcp.local.`
/// into the unescaped instance name and the service type.
///
/// The type keeps its leading `.` and loses the `.local.` domain, giving
/// `._ipp._tcp` for the example above.
#[must_use]
pub fn split_full_name(full_name: &str) -> Option<(String, String)> {
    let bytes = full_name.as_bytes();
    let mut index = 0;
    while let Some(&byte) = bytes.get(index) {
        if byte == b'.' {
            break;
        }
        if byte == b'\\' {
            index += 1;
        }
        index += 1;
    }
    let name = full_name.get(..index)?;
    let rest = full_name.get(index..).filter(|rest| !rest.is_empty())?;
    Some((unescape(name), rest.replace(LOCAL_DOMAIN_SUFFIX, "")))
}

/// Reverses DNS presentation escaping: `\.` and `\\` stand for the literal
/// character and `\DDD` for the byte with decimal value `DDD`.
///
/// A truncated or malformed escape ends the name at that point.
#[must_use]
pub fn unescape(escaped: &str) -> String {
    let mut bytes = Vec::with_capacity(escaped.len());
    let mut input = escaped.bytes();
    while let Some(byte) = input.next() {
        if byte != b'\\' {
            bytes.push(byte);
            continue;
        }
        let Some(next) = input.next() else {
            warn!(target: NSD_TARGET, name = escaped, "unexpected end of escape sequence");
            break;
        };
        if next == b'.' || next == b'\\' {
            bytes.push(next);
            continue;
        }
        match decimal_escape(next, input.next(), input.next()) {
            Some(decoded) => bytes.push(decoded),
            None => {
                warn!(target: NSD_TARGET, name = escaped, "invalid decimal escape");
                break;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn decimal_escape(first: u8, second: Option<u8>, third: Option<u8>) -> Option<u8> {
    let digit = |byte: u8| byte.is_ascii_digit().then(|| u32::from(byte - b'0'));
    let value = digit(first)? * 100 + digit(second?)? * 10 + digit(third?)?;
    u8::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("_http._tcp", Some("_http._tcp.local"))]
    #[case("_ipp._udp", Some("_ipp._udp.local"))]
    #[case("_printer._http._tcp", Some("_printer._sub._http._tcp.local"))]
    #[case("_my-svc_x._tcp", Some("_my-svc_x._tcp.local"))]
    #[case("_http._tcp.", None)]
    #[case("http._tcp", None)]
    #[case("_http._sctp", None)]
    #[case("_http-._tcp", None)]
    #[case("_a._b._c._tcp", None)]
    #[case("", None)]
    fn normalises_service_types(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_service_type(input).as_deref(), expected);
    }

    #[test]
    fn rejects_labels_longer_than_sixty_three_characters() {
        let label = format!("_{}", "a".repeat(63));
        assert_eq!(normalize_service_type(&format!("{label}._tcp")), None);
        let longest = format!("_{}", "a".repeat(62));
        assert!(normalize_service_type(&format!("{longest}._tcp")).is_some());
    }

    #[rstest]
    #[case("Printer", "Printer")]
    #[case(r"My\.Printer", "My.Printer")]
    #[case(r"back\\slash", r"back\slash")]
    #[case(r"Living\032Room", "Living Room")]
    #[case(r"caf\195\169", "café")]
    #[case(r"trailing\", "trailing")]
    #[case(r"short\03", "short")]
    #[case(r"bad\0x1rest", "bad")]
    fn unescapes_dns_names(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(unescape(input), expected);
    }

    #[rstest]
    #[case(r"My\.Printer._ipp._tcp.local.", "My.Printer", "._ipp._tcp")]
    #[case(r"Living\032Room._http._tcp.local.", "Living Room", "._http._tcp")]
    #[case("plain._ssh._tcp.local.", "plain", "._ssh._tcp")]
    fn splits_full_names(#[case] full: &str, #[case] name: &str, #[case] service_type: &str) {
        assert_eq!(
            split_full_name(full),
            Some((name.to_owned(), service_type.to_owned()))
        );
    }

    #[rstest]
    #[case("no-dots-here")]
    #[case(r"escaped\.only")]
    fn full_names_without_a_separator_are_invalid(#[case] full: &str) {
        assert_eq!(split_full_name(full), None);
    }
}
