use serde::Serialize;
use std::path::{Path, PathBuf};

/// An automation instruction for the running host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    OpenProject { path: PathBuf },
    ImportAsset { path: PathBuf },
}

/// Acknowledgement that the host ran a directive without an application-level error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub kind: &'static str,
    pub pid: u32,
    pub output: String,
}

impl Directive {
    pub fn kind(&self) -> &'static str {
        match self {
            Directive::OpenProject { .. } => "open-project",
            Directive::ImportAsset { .. } => "import-asset",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Directive::OpenProject { path } | Directive::ImportAsset { path } => path,
        }
    }

    /// Render the directive as an ExtendScript program.
    ///
    /// Scripts throw on failure so the host reports an error instead of
    /// silently doing nothing.
    pub fn to_script(&self) -> String {
        let file = escape_script_string(&self.path().to_string_lossy());

        match self {
            Directive::OpenProject { .. } => format!(
                r#"(function () {{
    var target = new File("{file}");
    if (!target.exists) {{
        throw new Error("File does not exist: {file}");
    }}
    app.open(target);
}})();
"#
            ),
            Directive::ImportAsset { .. } => format!(
                r#"(function () {{
    var target = new File("{file}");
    if (!target.exists) {{
        throw new Error("File does not exist: {file}");
    }}
    if (!app.project) {{
        throw new Error("No active project to import into");
    }}
    app.project.importFile(new ImportOptions(target));
}})();
"#
            ),
        }
    }
}

fn escape_script_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let open = Directive::OpenProject {
            path: PathBuf::from("/p/ShotA/ShotA_comp.aep"),
        };
        let import = Directive::ImportAsset {
            path: PathBuf::from("/a/plate.mov"),
        };
        assert_eq!(open.kind(), "open-project");
        assert_eq!(import.kind(), "import-asset");
        assert_eq!(import.path(), Path::new("/a/plate.mov"));
    }

    #[test]
    fn test_import_script_calls_import_file() {
        let script = Directive::ImportAsset {
            path: PathBuf::from("/a/plate.mov"),
        }
        .to_script();

        assert!(script.contains(r#"new File("/a/plate.mov")"#));
        assert!(script.contains("app.project.importFile(new ImportOptions(target))"));
    }

    #[test]
    fn test_open_script_calls_app_open() {
        let script = Directive::OpenProject {
            path: PathBuf::from("/p/ShotA.aep"),
        }
        .to_script();
        assert!(script.contains("app.open(target)"));
    }

    #[test]
    fn test_windows_paths_and_quotes_escaped() {
        assert_eq!(
            escape_script_string(r#"C:\Assets\"odd".png"#),
            r#"C:\\Assets\\\"odd\".png"#
        );
    }
}
