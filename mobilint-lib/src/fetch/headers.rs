//! Rate limit headers of the GitHub REST API.
//!
//! GitHub reports an exhausted primary limit with `403` or `429` and
//! `x-ratelimit-remaining: 0`, and a secondary limit with `retry-after`.
//! See <https://docs.github.com/en/rest/using-the-rest-api/rate-limits-for-the-rest-api>

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

/// Longest wait for a rate limit to reset, 5 minutes
pub(crate) const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5 * 60);

/// Wait used when a throttled response does not say when to come back
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Parse the "Retry-After" header as specified per
/// [RFC 7231 section 7.1.3](https://www.rfc-editor.org/rfc/rfc7231#section-7.1.3)
pub(crate) fn parse_retry_after(value: &HeaderValue) -> Option<Duration> {
    let value = value.to_str().ok()?;

    // RFC 7231: Retry-After = HTTP-date / delay-seconds
    value.parse::<u64>().map(Duration::from_secs).ok().or_else(|| {
        httpdate::parse_http_date(value)
            .ok()
            // if date is in the past, we can use ZERO
            .map(|date| date.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
    })
}

/// Requests left in the current rate limit window
pub(crate) fn parse_remaining(headers: &HeaderMap) -> Option<u64> {
    parse_header_value(headers, "x-ratelimit-remaining")
}

/// Time until the rate limit window resets.
///
/// `x-ratelimit-reset` holds the reset time in UTC epoch seconds.
pub(crate) fn parse_reset(headers: &HeaderMap) -> Option<Duration> {
    let reset = UNIX_EPOCH + Duration::from_secs(parse_header_value(headers, "x-ratelimit-reset")?);
    Some(
        reset
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

fn parse_header_value<T: FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

/// How long to wait before retrying a request that failed with `status`.
///
/// Returns `None` if the failure was not caused by a rate limit. The wait
/// never exceeds [`MAX_RATE_LIMIT_WAIT`].
pub(crate) fn rate_limit_wait(status: StatusCode, headers: &HeaderMap) -> Option<Duration> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let wait = if let Some(retry_after) = headers.get(RETRY_AFTER).and_then(parse_retry_after) {
        retry_after
    } else if parse_remaining(headers) == Some(0) {
        parse_reset(headers).unwrap_or(DEFAULT_RATE_LIMIT_WAIT)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        DEFAULT_RATE_LIMIT_WAIT
    } else {
        // A plain 403, e.g. a private repository
        return None;
    };
    Some(wait.min(MAX_RATE_LIMIT_WAIT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn value(v: &str) -> HeaderValue {
        HeaderValue::from_str(v).unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, v) in pairs {
            headers.insert(*name, value(v));
        }
        headers
    }

    fn epoch_in(duration: Duration) -> String {
        (SystemTime::now() + duration)
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .to_string()
    }

    #[test]
    fn test_retry_after() {
        assert_eq!(parse_retry_after(&value("1")), Some(Duration::from_secs(1)));
        assert_eq!(parse_retry_after(&value("-1")), None);

        assert_eq!(
            parse_retry_after(&value("Fri, 15 May 2015 15:34:21 GMT")),
            Some(Duration::ZERO)
        );

        let result = parse_retry_after(&value("Fri, 15 May 4099 15:34:21 GMT"));
        assert!(matches!(result, Some(d) if d.as_secs() > 0));
    }

    #[test]
    fn test_reset_in_the_past_is_zero() {
        let headers = headers(&[("x-ratelimit-reset", "1700000000")]);
        assert_eq!(parse_reset(&headers), Some(Duration::ZERO));
        assert_eq!(parse_reset(&HeaderMap::new()), None);
    }

    #[test]
    fn test_plain_forbidden_is_not_a_rate_limit() {
        assert_eq!(rate_limit_wait(StatusCode::FORBIDDEN, &HeaderMap::new()), None);
        let headers = headers(&[("x-ratelimit-remaining", "42")]);
        assert_eq!(rate_limit_wait(StatusCode::FORBIDDEN, &headers), None);
        assert_eq!(rate_limit_wait(StatusCode::NOT_FOUND, &headers), None);
    }

    #[test]
    fn test_retry_after_wins() {
        let headers = headers(&[
            ("retry-after", "2"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", epoch_in(Duration::from_secs(120)).as_str()),
        ]);
        assert_eq!(
            rate_limit_wait(StatusCode::FORBIDDEN, &headers),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_exhausted_limit_waits_for_reset() {
        let headers = headers(&[
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", epoch_in(Duration::from_secs(100)).as_str()),
        ]);
        let wait = rate_limit_wait(StatusCode::FORBIDDEN, &headers).unwrap();
        assert!(wait > Duration::from_secs(90) && wait <= Duration::from_secs(100));
    }

    #[test]
    fn test_wait_is_capped() {
        let headers = headers(&[
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", epoch_in(Duration::from_secs(3600)).as_str()),
        ]);
        assert_eq!(
            rate_limit_wait(StatusCode::FORBIDDEN, &headers),
            Some(MAX_RATE_LIMIT_WAIT)
        );
        assert_eq!(
            rate_limit_wait(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new()),
            Some(DEFAULT_RATE_LIMIT_WAIT)
        );
    }
}
