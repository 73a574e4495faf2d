//! Process specification handed to the helper.
//!
//! Serialises to the `process` object of the OCI runtime spec, which is what
//! the low-level runtime consumes.

use serde::{Deserialize, Serialize};

/// User the process runs as inside the container.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: u32,
    pub gid: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_gids: Vec<u32>,
}

/// Console size as encoded in the OCI process object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSize {
    pub height: u16,
    pub width: u16,
}

/// What to execute. `args[0]` is the program path.
///
/// # Examples
///
/// ```
/// # use procshim_shared::ProcessSpec;
/// let spec = ProcessSpec::new("/bin/sh")
///     .args(["-c", "echo hello"])
///     .env("PATH", "/usr/bin:/bin")
///     .cwd("/tmp");
/// assert_eq!(spec.path(), Some("/bin/sh"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    #[serde(default)]
    pub terminal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_size: Option<ConsoleSize>,
    #[serde(default)]
    pub user: User,
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub cwd: String,
}

impl ProcessSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            terminal: false,
            console_size: None,
            user: User::default(),
            args: vec![path.into()],
            env: Vec::new(),
            cwd: String::new(),
        }
    }

    /// Append arguments after the program path.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a `KEY=VALUE` environment entry.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env.push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn user(mut self, uid: u32, gid: u32) -> Self {
        self.user.uid = uid;
        self.user.gid = gid;
        self
    }

    /// Request a terminal with an initial geometry.
    pub fn terminal(mut self, size: Option<WindowSize>) -> Self {
        self.terminal = true;
        self.console_size = size.map(|s| ConsoleSize {
            height: s.rows,
            width: s.columns,
        });
        self
    }

    /// Program path, if any arguments are set.
    pub fn path(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Split `env` into `(key, value)` pairs; entries without `=` map to an
    /// empty value.
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env
            .iter()
            .map(|entry| entry.split_once('=').unwrap_or((entry.as_str(), "")))
    }
}

/// A process spec plus the host identity that should own its pty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedSpec {
    pub process: ProcessSpec,
    pub host_uid: u32,
    pub host_gid: u32,
}

impl PreparedSpec {
    pub fn new(process: ProcessSpec) -> Self {
        Self {
            process,
            host_uid: 0,
            host_gid: 0,
        }
    }

    pub fn with_host_ids(mut self, uid: u32, gid: u32) -> Self {
        self.host_uid = uid;
        self.host_gid = gid;
        self
    }
}

/// Terminal geometry, also the wire format of the `winsz` FIFO.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub columns: u16,
    pub rows: u16,
}

impl WindowSize {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }
}

/// TTY request for `run` and `set_tty`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TtySpec {
    pub window_size: Option<WindowSize>,
}

impl TtySpec {
    pub fn new(window_size: Option<WindowSize>) -> Self {
        Self { window_size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_spec_oci_encoding() {
        let spec = ProcessSpec::new("/bin/sh")
            .args(["-c", "exit 0"])
            .env("FOO", "bar")
            .cwd("/")
            .user(1000, 1001);

        let json: serde_json::Value = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["args"], serde_json::json!(["/bin/sh", "-c", "exit 0"]));
        assert_eq!(json["env"], serde_json::json!(["FOO=bar"]));
        assert_eq!(json["user"]["uid"], 1000);
        assert_eq!(json["user"]["gid"], 1001);
        assert_eq!(json["terminal"], false);
        assert!(json.get("consoleSize").is_none());
        assert!(json["user"].get("additionalGids").is_none());
    }

    #[test]
    fn test_terminal_sets_console_size() {
        let spec = ProcessSpec::new("/bin/sh").terminal(Some(WindowSize::new(80, 24)));
        let json: serde_json::Value = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["terminal"], true);
        assert_eq!(json["consoleSize"]["width"], 80);
        assert_eq!(json["consoleSize"]["height"], 24);
    }

    #[test]
    fn test_decode_minimal_process() {
        let spec: ProcessSpec = serde_json::from_str(r#"{"args":["true"]}"#).unwrap();
        assert_eq!(spec.path(), Some("true"));
        assert!(spec.env.is_empty());
        assert_eq!(spec.user, User::default());
    }

    #[test]
    fn test_env_pairs() {
        let mut spec = ProcessSpec::new("env").env("A", "1=2");
        spec.env.push("BARE".into());
        let pairs: Vec<_> = spec.env_pairs().collect();
        assert_eq!(pairs, vec![("A", "1=2"), ("BARE", "")]);
    }

    #[test]
    fn test_window_size_wire_format() {
        let json = serde_json::to_string(&WindowSize::new(132, 43)).unwrap();
        assert_eq!(json, r#"{"columns":132,"rows":43}"#);
    }
}
