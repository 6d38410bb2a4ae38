// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use sftpfs::{Config, Credential};

use super::{Address, Target, log_directives, parse_address};

#[rstest]
#[case("me@example.com", "me", "example.com", None)]
#[case("me@example.com:2222", "me", "example.com", Some(2222))]
#[case("me@[::1]", "me", "[::1]", None)]
#[case("me@[::1]:2222", "me", "[::1]", Some(2222))]
#[case("first.last@corp.com@example.com", "first.last@corp.com", "example.com", None)]
fn test_parse_address(
    #[case] address: &str,
    #[case] user: &str,
    #[case] host: &str,
    #[case] port: Option<u16>,
) {
    let expected = Address {
        user: user.to_string(),
        host: host.to_string(),
        port,
    };
    assert_eq!(parse_address(address).unwrap(), expected);
}

#[rstest]
#[case("example.com")]
#[case("@example.com")]
#[case("me@")]
#[case("me@example.com:")]
#[case("me@example.com:ssh")]
#[case("me@example.com:70000")]
#[case("me@[::1]2222")]
fn test_parse_address_invalid(#[case] address: &str) {
    assert!(parse_address(address).is_err(), "{address} should be invalid");
}

#[rstest]
#[case(0, None, None, "sftpfs=info,warn")]
#[case(0, Some("sftpfs=trace"), None, "sftpfs=trace")]
#[case(1, Some("sftpfs=trace"), None, "sftpfs=debug,info")]
#[case(2, None, Some("ssh2=debug"), "sftpfs=trace,info,ssh2=debug")]
#[case(9, None, None, "trace")]
fn test_log_directives(
    #[case] verbosity: u8,
    #[case] existing: Option<&str>,
    #[case] overrides: Option<&str>,
    #[case] expected: &str,
) {
    let actual = log_directives(
        verbosity,
        existing.map(String::from),
        overrides.map(String::from),
    );
    assert_eq!(actual, expected);
}

fn target(name: &str) -> Target {
    Target {
        target: name.to_string(),
        password: None,
        identity: None,
        passphrase: None,
        root: None,
    }
}

#[rstest]
fn test_target_from_address() {
    let config = Config::default();
    let mut target = target("me@example.com:2200");
    target.password = Some("hunter2".into());
    let context = target.mount_context(&config).unwrap();
    assert_eq!(context.user(), "me");
    assert_eq!(context.address(), "example.com:2200");
    assert_eq!(context.root(), "/");
    assert_eq!(context.volume_label(), "SFTP");
    assert_eq!(context.credential(), &Credential::Password("hunter2".into()));
}

#[rstest]
fn test_target_uses_configured_port() {
    let config = Config::load_string("[connection]\nport = 2022\n").unwrap();
    let context = target("me@example.com").mount_context(&config).unwrap();
    assert_eq!(context.port(), 2022);
}

#[rstest]
fn test_target_from_preset() {
    let config = Config::load_string(
        r#"
[presets.work]
host = "files.example.com"
user = "builder"
root = "/srv/work"
"#,
    )
    .unwrap();
    let mut target = target("work");
    target.password = Some("secret".into());
    let context = target.mount_context(&config).unwrap();
    assert_eq!(context.host(), "files.example.com");
    assert_eq!(context.root(), "/srv/work");
    assert_eq!(context.credential(), &Credential::Password("secret".into()));
}

#[rstest]
fn test_target_identity_overrides_preset() {
    let config = Config::load_string(
        r#"
[presets.work]
host = "files.example.com"
user = "builder"
"#,
    )
    .unwrap();
    let mut target = target("work");
    target.identity = Some("/home/me/.ssh/id_ed25519".into());
    target.passphrase = Some("words".into());
    target.root = Some("/tmp".into());
    let context = target.mount_context(&config).unwrap();
    assert_eq!(context.root(), "/tmp");
    assert_eq!(
        context.credential(),
        &Credential::PrivateKey {
            identity: "/home/me/.ssh/id_ed25519".into(),
            passphrase: Some("words".into()),
        }
    );
}

#[rstest]
fn test_target_neither_preset_nor_address() {
    let config = Config::default();
    assert!(target("nowhere").mount_context(&config).is_err());
}
