use std::sync::LazyLock;

use regex::Regex;

use super::Rule;
use crate::{AnalysisKind, FindingKind, Language, Severity};

use FindingKind::{Issue, Recommendation};
use Language::{CSharp, Dart, Java, JavaScript, Kotlin, ObjectiveC, Swift, TypeScript, Xml};

const JVM: &[Language] = &[Java, Kotlin];
const WEB: &[Language] = &[JavaScript, TypeScript];
const APPLE: &[Language] = &[Swift, ObjectiveC];

fn rule(
    title: &'static str,
    pattern: &str,
    severity: Severity,
    kind: FindingKind,
    description: &'static str,
    recommendation: &'static str,
    languages: &'static [Language],
) -> Rule {
    Rule {
        title,
        pattern: Regex::new(pattern).unwrap(),
        exclude: None,
        severity,
        kind,
        description,
        recommendation,
        languages,
    }
}

fn excluding(mut rule: Rule, exclude: &str) -> Rule {
    rule.exclude = Some(Regex::new(exclude).unwrap());
    rule
}

static SECURITY: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            "Hardcoded secret",
            r#"(?i)(api|secret|token|password|passwd|client_secret|access_key)[_-]?(key|token|secret)?["']?\s*[:=]\s*["'][A-Za-z0-9_\-.=]{16,}["']|["'](sk|pk|ak)_live_[A-Za-z0-9]{24,}["']"#,
            Severity::High,
            Issue,
            "A credential is embedded in the source code and ships with every build",
            "Load secrets at runtime from a secure store or a backend service",
            &[],
        ),
        excluding(
            rule(
                "Cleartext HTTP URL",
                r"http://",
                Severity::Medium,
                Issue,
                "Traffic to this URL is not encrypted and can be read or modified in transit",
                "Use HTTPS for every remote endpoint",
                &[],
            ),
            r"localhost|127\.0\.0\.1|10\.\d+\.|192\.168\.|xmlns|schemas\.android\.com|www\.w3\.org|apple\.com/DTDs",
        ),
        rule(
            "TLS certificate validation disabled",
            r"ALLOW_ALL_HOSTNAME_VERIFIER|AllTrustManager|rejectUnauthorized:\s*false|badCertificateCallback|ServerCertificateValidationCallback\s*\+?=\s*\(?[^)]*\)?\s*=>\s*true",
            Severity::Critical,
            Issue,
            "Any certificate is accepted, which enables man-in-the-middle attacks",
            "Keep the platform's certificate validation and consider certificate pinning",
            &[],
        ),
        rule(
            "App Transport Security disabled",
            r"NSAllowsArbitraryLoads",
            Severity::High,
            Issue,
            "ATS exceptions allow cleartext and weak TLS connections",
            "Remove NSAllowsArbitraryLoads and add narrow per-domain exceptions if needed",
            &[Xml],
        ),
        rule(
            "Debuggable build",
            r#"android:debuggable\s*=\s*"true""#,
            Severity::High,
            Issue,
            "Debuggable apps can be attached to and inspected on any device",
            "Remove android:debuggable and let the build type decide",
            &[Xml],
        ),
        rule(
            "Weak hash algorithm",
            r#"(?i)["'\s(](md5|sha-?1)["'\s)]"#,
            Severity::Medium,
            Issue,
            "MD5 and SHA-1 are broken for security purposes",
            "Use SHA-256 or a dedicated password hashing function",
            &[],
        ),
        rule(
            "Weak cipher",
            r#"\b(DES|3DES|DESede|RC4|Blowfish)\b|/ECB/"#,
            Severity::High,
            Issue,
            "The cipher or mode does not provide adequate confidentiality",
            "Use AES-GCM with a random nonce",
            &[],
        ),
        rule(
            "World accessible preferences",
            r"MODE_WORLD_(READABLE|WRITEABLE)",
            Severity::High,
            Issue,
            "Other apps can read or write this preference file",
            "Use MODE_PRIVATE and EncryptedSharedPreferences for sensitive values",
            JVM,
        ),
        rule(
            "Unencrypted local storage",
            r"\b(AsyncStorage|localStorage|NSUserDefaults|UserDefaults\.standard)\b",
            Severity::Low,
            Recommendation,
            "Values in this store are kept in plain text on the device",
            "Keep tokens and personal data in the Keychain or Keystore",
            &[JavaScript, TypeScript, Swift, ObjectiveC],
        ),
        rule(
            "Dynamic code evaluation",
            r"\beval\s*\(|new\s+Function\s*\(",
            Severity::High,
            Issue,
            "Evaluating strings as code enables injection",
            "Parse data explicitly instead of evaluating it",
            WEB,
        ),
        rule(
            "JavaScript enabled in WebView",
            r"setJavaScriptEnabled\s*\(\s*true\s*\)|javaScriptEnabled\s*=\s*true",
            Severity::Medium,
            Issue,
            "Script execution in a WebView widens the attack surface for untrusted content",
            "Only enable JavaScript for trusted, HTTPS-only content",
            JVM,
        ),
    ]
});

static PERFORMANCE: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            "Collection size evaluated on every iteration",
            r"for\s*\(\s*int\s+\w+\s*=\s*0\s*;\s*\w+\s*<\s*\w+\.size\(\)\s*;",
            Severity::Low,
            Recommendation,
            "size() is called on every loop iteration",
            "Store the size in a local variable or use an enhanced for loop",
            &[Java],
        ),
        rule(
            "Array length evaluated on every iteration",
            r"for\s*\(\s*(var|let)\s+\w+\s*=\s*0\s*;\s*\w+\s*<\s*\w+\.length\s*;",
            Severity::Low,
            Recommendation,
            "length is read on every loop iteration",
            "Use for...of or cache the length",
            WEB,
        ),
        rule(
            "Blocking sleep",
            r"Thread\.sleep\s*\(|SystemClock\.sleep\s*\(|sleep\(forTimeInterval|usleep\s*\(",
            Severity::Medium,
            Issue,
            "Sleeping blocks the calling thread, which freezes the UI on the main thread",
            "Schedule delayed work with a handler, coroutine or dispatch queue",
            &[Java, Kotlin, Swift, ObjectiveC, CSharp],
        ),
        rule(
            "Blocking coroutine bridge",
            r"\brunBlocking\s*\{",
            Severity::Medium,
            Issue,
            "runBlocking blocks the current thread until the coroutine completes",
            "Launch the work from a coroutine scope instead",
            &[Kotlin],
        ),
        rule(
            "Full list refresh",
            r"notifyDataSetChanged\s*\(\s*\)",
            Severity::Low,
            Recommendation,
            "Every visible row is rebound even if only one item changed",
            "Use DiffUtil or the granular notifyItem* methods",
            JVM,
        ),
        rule(
            "Eagerly built list",
            r"ListView\s*\(\s*children\s*:",
            Severity::Low,
            Recommendation,
            "All children are built up front, even those off screen",
            "Use ListView.builder for long or dynamic lists",
            &[Dart],
        ),
    ]
});

static MEMORY: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            "Static reference to a context",
            r"static\s+(Context|Activity|Fragment|View)\b",
            Severity::High,
            Issue,
            "A static field keeps the whole activity and its view tree alive",
            "Hold the application context or a WeakReference instead",
            &[Java],
        ),
        rule(
            "Non-static handler",
            r"new\s+Handler\s*\(\s*\)",
            Severity::Medium,
            Issue,
            "An implicit handler holds a reference to its outer class while messages are pending",
            "Use a static handler class with a WeakReference, or Handler(Looper.getMainLooper())",
            &[Java],
        ),
        rule(
            "Interval timer",
            r"\bsetInterval\s*\(",
            Severity::Medium,
            Issue,
            "An interval that is never cleared keeps its closure alive",
            "Call clearInterval when the component unmounts",
            WEB,
        ),
        rule(
            "Event listener registration",
            r"\baddEventListener\s*\(",
            Severity::Low,
            Recommendation,
            "Listeners that are never removed leak their closures",
            "Remove the listener in the matching cleanup hook",
            WEB,
        ),
        rule(
            "Full size bitmap decoding",
            r"BitmapFactory\.decode(Resource|File|Stream)",
            Severity::Medium,
            Issue,
            "Decoding without sampling loads the full resolution image into memory",
            "Set inSampleSize or use an image loading library",
            JVM,
        ),
        rule(
            "Unmanaged stream",
            r"new\s+(FileInputStream|FileOutputStream|BufferedReader|BufferedWriter)\s*\(",
            Severity::Medium,
            Issue,
            "The stream is not guaranteed to be closed on every path",
            "Use try-with-resources or Kotlin's use {}",
            &[Java],
        ),
        rule(
            "Explicit garbage collection",
            r"System\.gc\s*\(\s*\)",
            Severity::Low,
            Recommendation,
            "Forcing a collection is a hint at best and stalls the app at worst",
            "Remove the call and fix the allocation pattern instead",
            JVM,
        ),
    ]
});

static BATTERY: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            "High accuracy location updates",
            r"PRIORITY_HIGH_ACCURACY|kCLLocationAccuracyBest\b|startUpdatingLocation\s*\(",
            Severity::Medium,
            Issue,
            "Continuous high accuracy location keeps the GPS powered",
            "Use balanced accuracy and stop updates when they are not needed",
            &[Java, Kotlin, Swift, ObjectiveC],
        ),
        rule(
            "Wake lock",
            r"newWakeLock\s*\(|FLAG_KEEP_SCREEN_ON|isIdleTimerDisabled\s*=\s*true",
            Severity::High,
            Issue,
            "The device is kept awake until the lock is released",
            "Prefer WorkManager or release the lock with a timeout",
            &[],
        ),
        rule(
            "Busy loop",
            r"while\s*\(\s*true\s*\)|for\s*\(\s*;\s*;\s*\)",
            Severity::Medium,
            Issue,
            "An unbounded loop can keep the CPU busy indefinitely",
            "Wait on an event or schedule the work instead of spinning",
            &[],
        ),
        rule(
            "Fixed rate timer",
            r"scheduleAtFixedRate|Timer\.scheduledTimer|Timer\.periodic",
            Severity::Medium,
            Issue,
            "Periodic timers wake the device even when nothing changed",
            "Use push updates or batch the work with a job scheduler",
            &[],
        ),
        rule(
            "Radio scanning",
            r"startLeScan\s*\(|startDiscovery\s*\(|\.startScan\s*\(",
            Severity::Medium,
            Issue,
            "Bluetooth and Wi-Fi scans are expensive radio operations",
            "Scan with filters, for a bounded time and in low power mode",
            JVM,
        ),
        rule(
            "Repeating alarm",
            r"setRepeating\s*\(|setExactAndAllowWhileIdle\s*\(",
            Severity::Low,
            Recommendation,
            "Exact or repeating alarms defeat Doze batching",
            "Use inexact alarms or WorkManager periodic work",
            JVM,
        ),
    ]
});

/// The built-in rules of one kind
pub(super) fn builtin(kind: AnalysisKind) -> Vec<Rule> {
    let rules = match kind {
        AnalysisKind::Security => &SECURITY,
        AnalysisKind::Performance => &PERFORMANCE,
        AnalysisKind::Memory => &MEMORY,
        AnalysisKind::Battery => &BATTERY,
    };
    rules.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{LocalDetector, PatternDetector};
    use crate::AppType;
    use rstest::rstest;

    #[rstest]
    #[case(AnalysisKind::Security, Language::Kotlin, r#"val apiKey = "AIzaSyD3x4mPl3K3yV4lu3abc""#, "Hardcoded secret")]
    #[case(AnalysisKind::Security, Language::Java, "MessageDigest.getInstance(\"MD5\")", "Weak hash algorithm")]
    #[case(AnalysisKind::Security, Language::Xml, "<key>NSAllowsArbitraryLoads</key><true/>", "App Transport Security disabled")]
    #[case(AnalysisKind::Performance, Language::Kotlin, "runBlocking { load() }", "Blocking coroutine bridge")]
    #[case(AnalysisKind::Memory, Language::Java, "private static Context context;", "Static reference to a context")]
    #[case(AnalysisKind::Memory, Language::TypeScript, "const id = setInterval(tick, 1000);", "Interval timer")]
    #[case(AnalysisKind::Battery, Language::Java, "pm.newWakeLock(PARTIAL_WAKE_LOCK, TAG);", "Wake lock")]
    #[case(AnalysisKind::Battery, Language::Dart, "Timer.periodic(d, (_) => poll());", "Fixed rate timer")]
    fn test_rule_matches(
        #[case] kind: AnalysisKind,
        #[case] language: Language,
        #[case] code: &str,
        #[case] title: &str,
    ) {
        let findings =
            PatternDetector::builtin(kind).analyze(code, "file", language, AppType::Unknown);
        assert!(
            findings.iter().any(|f| f.title == title),
            "expected `{title}` in {findings:?}"
        );
    }
}
