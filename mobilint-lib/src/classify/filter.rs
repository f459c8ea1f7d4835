use crate::AppType;

/// Largest file analyzed, in bytes. Build and manifest files may be twice
/// as large.
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Path fragments of files that are never analyzed
const EXCLUDED_PATTERNS: &[&str] = &[
    ".git",
    ".github",
    "node_modules",
    "build/generated",
    "build/intermediates",
    ".gradle/",
    ".idea",
    ".vscode",
    ".dart_tool",
    "/pods/",
    ".ds_store",
    "thumbs.db",
    ".gitignore",
    "license",
    "readme",
    "yarn.lock",
    "package-lock.json",
    "podfile.lock",
    ".classpath",
    ".project",
    ".settings",
    "gradlew",
    "gradlew.bat",
    ".iml",
    "proguard-rules.pro",
    ".pbxproj",
];

/// Extensions considered when the app type is unknown
const COMMON_EXTENSIONS: &[&str] = &[
    ".java", ".kt", ".swift", ".m", ".h", ".cs", ".dart", ".js", ".jsx", ".ts", ".tsx", ".xaml",
    ".xml", ".gradle", ".plist", ".yaml", ".json",
];

fn extension(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(i) => &name[i..],
    }
}

/// Whether a file at `path` is worth analyzing for `app_type`
#[must_use]
pub fn should_analyze_file(path: &str, app_type: AppType) -> bool {
    let path = path.to_lowercase();
    let extension = extension(&path);

    if EXCLUDED_PATTERNS.iter().any(|p| path.contains(p)) {
        return false;
    }

    match app_type {
        AppType::NativeAndroid => {
            if matches!(extension, ".java" | ".kt") {
                return !(path.contains("/test/") || path.contains("/androidtest/"));
            }
            extension == ".xml"
                || ["manifest", "gradle", "/res/", "/assets/", "/src/main/"]
                    .iter()
                    .any(|p| path.contains(p))
        }
        AppType::Flutter => {
            extension == ".dart" || path.contains("pubspec.yaml") || path.contains("flutter")
        }
        AppType::ReactNative => {
            matches!(extension, ".js" | ".jsx" | ".ts" | ".tsx")
                || path.contains("package.json")
                || path.contains("app.json")
                || path.contains("react-native.config.js")
        }
        AppType::Xamarin => {
            matches!(extension, ".cs" | ".xaml" | ".xml")
                || path.contains(".csproj")
                || path.contains("manifest")
                || path.contains("info.plist")
        }
        AppType::NativeIos => {
            matches!(extension, ".swift" | ".m" | ".h" | ".storyboard" | ".xib")
                || path.contains("info.plist")
                || path.contains("appdelegate")
                || path.contains("/assets/")
        }
        AppType::Unknown => {
            COMMON_EXTENSIONS.contains(&extension)
                || [
                    "manifest",
                    "info.plist",
                    "build.gradle",
                    "pubspec.yaml",
                    "package.json",
                ]
                .iter()
                .any(|p| path.contains(p))
        }
    }
}

/// Whether a file of `size` bytes at `path` is small enough to analyze
#[must_use]
pub fn is_file_size_acceptable(path: &str, size: u64) -> bool {
    let path = path.to_lowercase();
    let important = ["manifest", "gradle", "pubspec.yaml", "package.json"]
        .iter()
        .any(|p| path.contains(p));
    let limit = if important {
        MAX_FILE_SIZE * 2
    } else {
        MAX_FILE_SIZE
    };
    size <= limit
}

/// Sort key of a file when more files exist than may be fetched.
/// Lower is fetched first.
#[must_use]
pub fn fetch_priority(path: &str, app_type: AppType) -> u32 {
    let path = path.to_lowercase();
    let extension = extension(&path);
    let specific = match (app_type, extension) {
        (AppType::Flutter, ".dart")
        | (AppType::ReactNative, ".js")
        | (AppType::NativeAndroid, ".java")
        | (AppType::NativeIos, ".swift")
        | (AppType::Xamarin, ".cs")
        | (AppType::Unknown, ".java") => Some(1),
        (AppType::ReactNative, ".jsx")
        | (AppType::NativeAndroid, ".kt")
        | (AppType::NativeIos, ".m")
        | (AppType::Xamarin, ".xaml")
        | (AppType::Unknown, ".kt") => Some(2),
        (AppType::ReactNative, ".ts") | (AppType::NativeIos, ".h") | (AppType::Unknown, ".swift") => {
            Some(3)
        }
        (AppType::ReactNative, ".tsx") | (AppType::Unknown, ".dart") => Some(4),
        (AppType::Flutter, ".yaml")
        | (AppType::NativeAndroid, ".gradle")
        | (AppType::NativeIos, ".plist")
        | (AppType::Xamarin, ".xml")
        | (AppType::Unknown, ".js") => Some(5),
        (AppType::Unknown, ".ts") => Some(6),
        (AppType::Unknown, ".cs") => Some(7),
        _ => None,
    };
    specific.unwrap_or(match extension {
        ".xml" => 10,
        ".gradle" => 20,
        ".json" => 30,
        _ => 999,
    })
}
