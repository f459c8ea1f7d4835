//! Directory builder to generate small app repositories for testing.
//!
//! This module provides [`DirBuilder`] which provides methods to easily
//! populate a given directory with source files. This is intended to allow
//! test fixtures to be defined within the test code.

use std::fmt::Debug;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::result::Result;

pub struct DirBuilder<'a> {
    path: &'a Path,
}

impl<'a> DirBuilder<'a> {
    pub fn new(path: &'a Path) -> DirBuilder<'a> {
        Self { path }
    }

    fn make_path(&self, subpath: &str) -> Result<PathBuf, String> {
        let subpath = Path::new(subpath);
        if !subpath.is_relative() {
            return Err(format!("subpath not relative: {subpath:?}"));
        }
        Ok(self.path.join(subpath))
    }

    fn append_bytes(&self, path: &Path, contents: &[u8]) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(debug_to_string)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(debug_to_string)?;

        let mut file = BufWriter::new(file);
        file.write_all(contents).map_err(debug_to_string)?;
        file.write_all(b"\n").map_err(debug_to_string)?;

        Ok(())
    }

    pub fn raw(&self, subpath: &str, contents: &[u8]) -> Result<PathBuf, String> {
        let path = self.make_path(subpath)?;
        self.append_bytes(&path, contents)?;
        Ok(path)
    }

    pub fn str(&self, subpath: &str, contents: &str) -> Result<PathBuf, String> {
        self.raw(subpath, contents.as_bytes())
    }

    /// An Android manifest requesting the given permissions
    pub fn manifest(&self, subpath: &str, permissions: &[&str]) -> Result<PathBuf, String> {
        let mut content = String::from(
            "<manifest xmlns:android=\"http://schemas.android.com/apk/res/android\">\n",
        );
        for permission in permissions {
            content.push_str(&format!(
                "    <uses-permission android:name=\"android.permission.{permission}\"/>\n"
            ));
        }
        content.push_str("</manifest>");
        self.str(subpath, &content)
    }

    /// A Kotlin activity whose `onCreate` runs the given statements
    pub fn activity(&self, subpath: &str, statements: &[&str]) -> Result<PathBuf, String> {
        let name = Path::new(subpath)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("MainActivity");
        let mut content = format!(
            "class {name} : AppCompatActivity() {{\n    override fun onCreate(savedInstanceState: Bundle?) {{\n"
        );
        for statement in statements {
            content.push_str(&format!("        {statement}\n"));
        }
        content.push_str("    }\n}");
        self.str(subpath, &content)
    }
}

// https://internals.rust-lang.org/t/to-debug-a-debug-counterpart-of-to-string/11228/3
fn debug_to_string<T: Debug>(t: T) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    buf.write_fmt(format_args!("{:?}", t))
        .expect("a Debug implementation returned an error unexpectedly");
    buf.shrink_to_fit();
    buf
}
