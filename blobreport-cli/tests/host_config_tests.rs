use blobreport_cli::{CoreConfig, HostConfig};
use blobreport_cloud::CredentialMode;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

const CONFIG: &str = r#"{
  "core": { "workingDir": ".reg", "actualDir": "screenshots" },
  "plugins": {
    "reg-keygen-git-hash-plugin": true,
    "reg-publish-azure-blob-storage-plugin": {
      "url": "https://${ACCOUNT}.blob.core.windows.net",
      "containerName": "reports",
      "accountName": "$ACCOUNT",
      "accountKey": "$AZURE_STORAGE_KEY",
      "sasExpiryHour": 24
    }
  }
}"#;

fn env(name: &str) -> Option<String> {
    match name {
        "ACCOUNT" => Some("acct".into()),
        "AZURE_STORAGE_KEY" => Some("a2V5a2V5a2V5".into()),
        _ => None,
    }
}

#[test]
fn plugin_section_with_substituted_env() {
    let host = HostConfig::parse(CONFIG, env).unwrap();
    let plugin = host.plugin_config().unwrap();

    assert_eq!(plugin.url, "https://acct.blob.core.windows.net");
    assert_eq!(plugin.account_name.as_deref(), Some("acct"));
    assert_eq!(plugin.account_key.as_deref(), Some("a2V5a2V5a2V5"));
    assert_eq!(plugin.sas_expiry_hour, Some(24));
    assert_eq!(plugin.credential_mode(), CredentialMode::SharedKey);
    plugin.validate().unwrap();
}

#[test]
fn working_dirs_resolve_against_root() {
    let host = HostConfig::parse(CONFIG, env).unwrap();
    let dirs = host.working_dirs(Path::new("/ci/project"));
    assert_eq!(dirs.base, PathBuf::from("/ci/project/.reg"));
    assert_eq!(dirs.actual_dir, PathBuf::from("/ci/project/.reg/actual"));
    assert_eq!(dirs.expected_dir, PathBuf::from("/ci/project/.reg/expected"));
}

#[test]
fn create_options_carries_no_emit() {
    let host = HostConfig::parse(CONFIG, env).unwrap();
    let options = host.create_options(Path::new("/ci"), true).unwrap();
    assert!(options.no_emit);
    assert_eq!(options.options.container_name, "reports");
}

#[test]
fn core_defaults_when_absent() {
    let host = HostConfig::parse(r#"{"plugins":{}}"#, env).unwrap();
    assert_eq!(host.core, CoreConfig::default());
    assert_eq!(host.core.working_dir, PathBuf::from(".reg"));
}

#[test]
fn missing_plugin_section_is_error() {
    let host = HostConfig::parse(r#"{"core":{}}"#, env).unwrap();
    let err = host.plugin_config().unwrap_err();
    assert!(err.to_string().contains("reg-publish-azure-blob-storage-plugin"), "{err}");
}

#[test]
fn load_reads_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("regconfig.json");
    std::fs::write(
        &path,
        r#"{"plugins":{"reg-publish-azure-blob-storage-plugin":{"url":"http://127.0.0.1:10000/devstoreaccount1","containerName":"r"}}}"#,
    )
    .unwrap();

    let host = HostConfig::load(&path).unwrap();
    let plugin = host.plugin_config().unwrap();
    assert_eq!(plugin.endpoint(), "http://127.0.0.1:10000/devstoreaccount1");
    assert_eq!(plugin.sas_expiry_hour, None);
}

#[test]
fn load_missing_file_names_path() {
    let err = HostConfig::load(Path::new("/definitely/not/here/regconfig.json")).unwrap_err();
    assert!(format!("{err:#}").contains("/definitely/not/here/regconfig.json"));
}
