//! Local SSH key handling: fingerprints, key pair copies and generation.

use std::ffi::OsString;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::debug;

use crate::command::{CommandError, CommandRunner};
use crate::driver::public_key_path;

/// Default key generation binary.
pub const DEFAULT_SSH_KEYGEN_BIN: &str = "ssh-keygen";

/// Mode applied to private keys copied into the machine store.
#[cfg(unix)]
const PRIVATE_KEY_MODE: u32 = 0o600;

/// Errors raised while handling local SSH keys.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SshKeyError {
    /// Raised when public key text cannot be parsed.
    #[error("bad key")]
    BadKey,
    /// Raised when a key file cannot be read.
    #[error("could not read ssh key `{path}`: {message}")]
    Read {
        /// Path that could not be read.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when a key file cannot be written, copied, or restricted.
    #[error("could not write ssh key `{path}`: {message}")]
    Write {
        /// Path that could not be written.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when key generation fails.
    #[error("could not generate ssh key: {0}")]
    Generate(#[from] CommandError),
}

/// Computes the MD5 fingerprint of an OpenSSH public key line.
///
/// The second whitespace-delimited field holds the base64 key blob; the
/// fingerprint is the lowercase hex digest of the decoded bytes, without
/// separators.
///
/// # Errors
///
/// Returns [`SshKeyError::BadKey`] when the text has fewer than two fields or
/// the blob is not valid base64.
pub fn fingerprint(public_key: &str) -> Result<String, SshKeyError> {
    let blob = public_key
        .split_whitespace()
        .nth(1)
        .ok_or(SshKeyError::BadKey)?;
    let decoded = STANDARD.decode(blob).map_err(|_| SshKeyError::BadKey)?;
    Ok(format!("{:x}", md5::compute(decoded)))
}

/// Removes the colon separators from a provider fingerprint.
#[must_use]
pub fn strip_separators(fingerprint: &str) -> String {
    fingerprint.replace(':', "")
}

/// Reads the public half of the key pair rooted at `private_key`.
///
/// # Errors
///
/// Returns [`SshKeyError::Read`] when the `.pub` file cannot be read.
pub fn read_public_key(private_key: &Utf8Path) -> Result<String, SshKeyError> {
    let path = public_key_path(private_key);
    let (dir, file) = open_parent(&path).map_err(|message| SshKeyError::Read {
        path: path.clone(),
        message,
    })?;
    dir.read_to_string(file).map_err(|err| SshKeyError::Read {
        path: path.clone(),
        message: err.to_string(),
    })
}

/// Copies a key pair into `destination`, restricting the private key to its
/// owner.
///
/// # Errors
///
/// Returns [`SshKeyError::Read`] when the source cannot be opened and
/// [`SshKeyError::Write`] when the copy or permission change fails.
pub fn copy_key_pair(source: &Utf8Path, destination: &Utf8Path) -> Result<(), SshKeyError> {
    ensure_parent_dir(destination)?;
    copy_file(source, destination)?;
    copy_file(&public_key_path(source), &public_key_path(destination))?;
    restrict_private_key(destination)
}

fn copy_file(source: &Utf8Path, destination: &Utf8Path) -> Result<(), SshKeyError> {
    let (src_dir, src_file) = open_parent(source).map_err(|message| SshKeyError::Read {
        path: source.to_owned(),
        message,
    })?;
    let write_err = |message: String| SshKeyError::Write {
        path: destination.to_owned(),
        message,
    };
    let (dst_dir, dst_file) = open_parent(destination).map_err(write_err)?;
    src_dir
        .copy(src_file, &dst_dir, dst_file)
        .map_err(|err| write_err(err.to_string()))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_private_key(path: &Utf8Path) -> Result<(), SshKeyError> {
    use std::os::unix::fs::PermissionsExt as _;

    let write_err = |message: String| SshKeyError::Write {
        path: path.to_owned(),
        message,
    };
    let (dir, file) = open_parent(path).map_err(write_err)?;
    let permissions =
        cap_std::fs::Permissions::from_std(std::fs::Permissions::from_mode(PRIVATE_KEY_MODE));
    dir.set_permissions(file, permissions)
        .map_err(|err| write_err(err.to_string()))
}

#[cfg(not(unix))]
fn restrict_private_key(_path: &Utf8Path) -> Result<(), SshKeyError> {
    Ok(())
}

fn ensure_parent_dir(path: &Utf8Path) -> Result<(), SshKeyError> {
    let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) else {
        return Ok(());
    };
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| SshKeyError::Write {
        path: parent.to_owned(),
        message: err.to_string(),
    })
}

fn open_parent(path: &Utf8Path) -> Result<(Dir, &str), String> {
    let file = path
        .file_name()
        .ok_or_else(|| format!("path has no file name: {path}"))?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| err.to_string())?;
    Ok((dir, file))
}

/// Generates RSA key pairs by shelling out to `ssh-keygen`.
#[derive(Clone, Debug)]
pub struct KeyGenerator<R: CommandRunner> {
    runner: R,
    program: String,
}

impl<R: CommandRunner> KeyGenerator<R> {
    /// Creates a generator that runs the default `ssh-keygen` binary.
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            program: DEFAULT_SSH_KEYGEN_BIN.to_owned(),
        }
    }

    /// Overrides the key generation binary.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Writes a new passphrase-less key pair at `path` and `path.pub`.
    ///
    /// # Errors
    ///
    /// Returns [`SshKeyError::Write`] when the parent directory cannot be
    /// created and [`SshKeyError::Generate`] when the generator fails.
    pub fn generate(&self, path: &Utf8Path, comment: &str) -> Result<(), SshKeyError> {
        ensure_parent_dir(path)?;
        debug!(%path, "generating ssh key pair");
        let args: Vec<OsString> = [
            "-t",
            "rsa",
            "-b",
            "2048",
            "-N",
            "",
            "-C",
            comment,
            "-q",
            "-f",
            path.as_str(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        let output = self.runner.run(&self.program, &args)?;
        if output.is_success() {
            return Ok(());
        }
        Err(CommandError::failure(&self.program, output).into())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;
    use crate::test_support::{FIXTURE_FINGERPRINT, FIXTURE_PUBLIC_KEY, ScriptedKeygen};

    fn utf8_dir(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("non-utf8 temp dir: {}", path.display()))
    }

    #[test]
    fn fingerprint_matches_md5_of_decoded_blob() {
        let fp = fingerprint(FIXTURE_PUBLIC_KEY).expect("fixture key should parse");
        assert_eq!(fp, FIXTURE_FINGERPRINT);
        assert!(!fp.contains(':'));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("ssh-ed25519")]
    #[case("ssh-rsa\n")]
    fn fingerprint_rejects_single_field(#[case] text: &str) {
        assert_eq!(fingerprint(text), Err(SshKeyError::BadKey));
    }

    #[test]
    fn fingerprint_rejects_invalid_base64() {
        assert_eq!(
            fingerprint("ssh-rsa not*base64 comment"),
            Err(SshKeyError::BadKey)
        );
    }

    #[test]
    fn strip_separators_removes_colons() {
        assert_eq!(strip_separators("aa:bb:cc"), "aabbcc");
    }

    #[test]
    fn read_public_key_reports_missing_file() {
        let tmp = TempDir::new().expect("temp dir");
        let key = utf8_dir(&tmp).join("absent");
        let err = read_public_key(&key).expect_err("missing key should fail");
        assert!(
            matches!(err, SshKeyError::Read { ref path, .. } if path.as_str().ends_with("absent.pub")),
            "unexpected error: {err}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn copy_key_pair_copies_both_halves_and_restricts_mode() {
        use std::os::unix::fs::PermissionsExt as _;

        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_dir(&tmp);
        let source = root.join("id_source");
        std::fs::write(&source, "PRIVATE").expect("write private");
        std::fs::write(public_key_path(&source), FIXTURE_PUBLIC_KEY).expect("write public");

        let destination = root.join("machines").join("m1").join("id_rsa");
        copy_key_pair(&source, &destination).expect("copy should succeed");

        assert_eq!(
            std::fs::read_to_string(&destination).expect("read copy"),
            "PRIVATE"
        );
        assert_eq!(
            read_public_key(&destination).expect("read public copy"),
            FIXTURE_PUBLIC_KEY
        );
        let mode = std::fs::metadata(&destination)
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn generate_invokes_keygen_with_target_path() {
        let tmp = TempDir::new().expect("temp dir");
        let path = utf8_dir(&tmp).join("machines").join("m1").join("id_rsa");
        let runner = ScriptedKeygen::new();
        KeyGenerator::new(runner.clone())
            .generate(&path, "m1")
            .expect("generation should succeed");

        let calls = runner.invocations();
        assert_eq!(calls.len(), 1);
        let rendered = calls.first().map(|call| call.command_string());
        assert!(
            rendered
                .as_deref()
                .is_some_and(|cmd| cmd.starts_with("ssh-keygen -t rsa") && cmd.ends_with(path.as_str())),
            "unexpected invocation: {rendered:?}"
        );
        assert_eq!(
            read_public_key(&path).expect("public key written").trim_end(),
            FIXTURE_PUBLIC_KEY
        );
    }

    #[test]
    fn generate_runs_configured_program() {
        let tmp = TempDir::new().expect("temp dir");
        let path = utf8_dir(&tmp).join("id_rsa");
        let runner = ScriptedKeygen::new();
        KeyGenerator::new(runner.clone())
            .with_program("/opt/openssh/bin/ssh-keygen")
            .generate(&path, "m1")
            .expect("generation should succeed");

        let programs: Vec<String> = runner
            .invocations()
            .into_iter()
            .map(|call| call.program)
            .collect();
        assert_eq!(programs, vec![String::from("/opt/openssh/bin/ssh-keygen")]);
    }

    #[test]
    fn generate_surfaces_keygen_failure() {
        let tmp = TempDir::new().expect("temp dir");
        let path = utf8_dir(&tmp).join("id_rsa");
        let runner = ScriptedKeygen::failing();
        let err = KeyGenerator::new(runner)
            .generate(&path, "m1")
            .expect_err("generation should fail");
        assert!(
            matches!(err, SshKeyError::Generate(CommandError::Failure { .. })),
            "unexpected error: {err}"
        );
    }
}
