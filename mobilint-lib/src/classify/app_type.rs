use crate::{AppType, SourceFile};

/// Minimum score an app type needs to be reported
const MIN_SCORE: u32 = 5;

/// Paths containing these belong to a cross-platform wrapper, not to a
/// native project
fn is_cross_platform(path: &str) -> bool {
    path.contains("flutter") || path.contains("react-native")
}

#[derive(Debug, Default)]
struct Scores {
    flutter: u32,
    react_native: u32,
    xamarin: u32,
    native_android: u32,
    native_ios: u32,
}

impl Scores {
    fn score(&mut self, path: &str, content: &str) {
        let native = !is_cross_platform(path);

        // Flutter
        if path.contains("pubspec.yaml")
            && (content.contains("flutter:") || content.contains("sdk: flutter"))
        {
            self.flutter += 10;
        }
        if path.ends_with(".dart") {
            self.flutter += 2;
        }
        if path.contains("/lib/") {
            self.flutter += 1;
        }
        if path.contains("flutter") && !path.contains("flutter_test") {
            self.flutter += 1;
        }
        if path.contains("android/app/src") && path.contains("mainactivity") {
            self.flutter += 1;
        }
        if path.contains("ios/runner") {
            self.flutter += 1;
        }

        // React Native
        if path.contains("package.json") && content.contains("react-native") {
            self.react_native += 10;
        }
        if path.contains("app.json") && content.contains("expo") {
            self.react_native += 5;
        }
        if path.contains("react-native.config.js") {
            self.react_native += 5;
        }
        if path.contains("index.js") && content.contains("AppRegistry") {
            self.react_native += 5;
        }
        if path.ends_with(".jsx") || path.ends_with(".tsx") {
            self.react_native += 2;
        }
        if path.contains("android/app/src/main/java") && path.contains("mainactivity") {
            self.react_native += 1;
        }
        if path.contains("ios/") && path.contains("appdelegate") {
            self.react_native += 1;
        }
        if path.contains("node_modules/react-native") {
            self.react_native += 1;
        }

        // Xamarin
        if path.ends_with(".csproj")
            && (content.contains("Xamarin")
                || content.contains("<TargetFrameworkVersion>v")
                || content.contains("Microsoft.NET.Sdk"))
        {
            self.xamarin += 10;
        }
        if path.ends_with(".xaml") {
            self.xamarin += 3;
        }
        if path.ends_with(".cs")
            && (path.contains("/forms/") || path.contains("/android/") || path.contains("/ios/"))
        {
            self.xamarin += 2;
        }
        if path.contains("xamarin") {
            self.xamarin += 2;
        }
        if path.contains("mainactivity.cs") || path.contains("appdelegate.cs") {
            self.xamarin += 3;
        }
        if path.contains("info.plist") && path.contains("ios") {
            self.xamarin += 1;
        }
        if path.contains("androidmanifest.xml") && path.contains("android") {
            self.xamarin += 1;
        }

        // Native Android
        if path.contains("androidmanifest.xml") {
            self.native_android += 8;
        }
        if path.contains("build.gradle")
            && (content.contains("com.android.application")
                || content.contains("com.android.library"))
        {
            self.native_android += 8;
        }
        if path.contains("/res/layout/") {
            self.native_android += 3;
        }
        if path.contains("/res/values/") {
            self.native_android += 2;
        }
        if path.contains("/src/main/java/") || path.contains("/src/main/kotlin/") {
            self.native_android += 3;
        }
        if (path.ends_with(".java") || path.ends_with(".kt")) && native {
            self.native_android += 2;
        }
        if path.contains("mainactivity")
            || path.contains("application.java")
            || path.contains("application.kt")
        {
            self.native_android += 2;
        }

        // Native iOS
        if path.contains("info.plist") && path.contains("ios/") && native {
            self.native_ios += 5;
        }
        if path.contains("appdelegate.") && native {
            self.native_ios += 5;
        }
        if path.contains("xcodeproj") || path.contains("xcworkspace") {
            self.native_ios += 3;
        }
        if path.ends_with(".swift") && native {
            self.native_ios += 3;
        }
        if path.ends_with(".m") || path.ends_with(".h") {
            self.native_ios += 2;
        }
        if path.contains("viewcontroller") || path.contains("scenedelegate") {
            self.native_ios += 2;
        }
        if path.contains("base.lproj") || path.contains("launchscreen.storyboard") {
            self.native_ios += 2;
        }
        if path.contains("podfile") && native {
            self.native_ios += 3;
        }
    }

    /// Native markers are expected inside cross-platform projects, so they
    /// count less once a framework was found
    fn adjust(&mut self) {
        if self.flutter > 5 || self.react_native > 5 {
            self.native_android = self.native_android.saturating_sub(5);
            self.native_ios = self.native_ios.saturating_sub(5);
        }
        if self.xamarin > 5 {
            self.native_android = self.native_android.saturating_sub(3);
            self.native_ios = self.native_ios.saturating_sub(3);
        }
    }

    fn best(&self) -> AppType {
        let ranked = [
            (AppType::Flutter, self.flutter),
            (AppType::ReactNative, self.react_native),
            (AppType::Xamarin, self.xamarin),
            (AppType::NativeAndroid, self.native_android),
            (AppType::NativeIos, self.native_ios),
        ];
        // On a tie the earlier entry wins
        let (app_type, score) = ranked
            .into_iter()
            .fold((AppType::Unknown, 0), |best, candidate| {
                if candidate.1 > best.1 { candidate } else { best }
            });
        if score < MIN_SCORE {
            AppType::Unknown
        } else {
            app_type
        }
    }
}

/// Guess which kind of mobile project `files` belong to.
///
/// Every file adds to the score of the frameworks its path or content
/// hints at. Paths are compared case-insensitively. Returns
/// [`AppType::Unknown`] if no framework reaches a score of 5.
#[must_use]
pub fn detect_app_type(files: &[SourceFile]) -> AppType {
    let mut scores = Scores::default();
    for file in files {
        scores.score(&file.path.to_lowercase(), &file.content);
    }
    scores.adjust();
    log::debug!("App type scores: {scores:?}");
    scores.best()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> Vec<SourceFile> {
        entries
            .iter()
            .map(|(path, content)| SourceFile::new(*path, *content))
            .collect()
    }

    #[test]
    fn test_flutter() {
        let files = files(&[
            ("pubspec.yaml", "dependencies:\n  flutter:\n    sdk: flutter\n"),
            ("lib/main.dart", "void main() {}"),
            ("android/app/src/main/AndroidManifest.xml", "<manifest/>"),
        ]);
        assert_eq!(detect_app_type(&files), AppType::Flutter);
    }

    #[test]
    fn test_react_native() {
        let files = files(&[
            ("package.json", r#"{"dependencies": {"react-native": "0.74.0"}}"#),
            ("index.js", "AppRegistry.registerComponent(name, () => App);"),
            ("src/App.tsx", ""),
        ]);
        assert_eq!(detect_app_type(&files), AppType::ReactNative);
    }

    #[test]
    fn test_native_android() {
        let files = files(&[
            ("app/src/main/AndroidManifest.xml", "<manifest/>"),
            ("app/build.gradle", "plugins { id 'com.android.application' }"),
            ("app/src/main/java/com/example/MainActivity.java", ""),
        ]);
        assert_eq!(detect_app_type(&files), AppType::NativeAndroid);
    }

    #[test]
    fn test_native_ios_with_mixed_case_paths() {
        let files = files(&[
            ("App/AppDelegate.swift", ""),
            ("App/ViewController.swift", ""),
            ("App.xcodeproj/project.pbxproj", ""),
        ]);
        assert_eq!(detect_app_type(&files), AppType::NativeIos);
    }

    #[test]
    fn test_xamarin() {
        let files = files(&[
            ("App/App.csproj", "<Project Sdk=\"Microsoft.NET.Sdk\">"),
            ("App/MainPage.xaml", ""),
        ]);
        assert_eq!(detect_app_type(&files), AppType::Xamarin);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(detect_app_type(&[]), AppType::Unknown);
        let files = files(&[("src/lib.rs", ""), ("README.md", "")]);
        assert_eq!(detect_app_type(&files), AppType::Unknown);
    }
}
