//! Provisioner for systemd-based Linux distributions.
//!
//! Package commands are rendered for the distribution's package manager;
//! services are driven through `systemctl`. Provisioning installs the engine,
//! writes `/etc/docker/daemon.json` from the engine and auth options, writes
//! a systemd drop-in that owns the daemon's listen addresses, and restarts
//! the engine. Certificates are expected to already be present at the remote
//! paths named in the auth options.
//!
//! Listen addresses live only in the drop-in: the packaged unit passes `-H`
//! on the command line, and dockerd refuses to start when `hosts` is also set
//! in `daemon.json`.

use crate::actions::{PackageAction, ServiceAction};
use crate::os_release::OsRelease;
use crate::registry::ProvisionerFactory;
use crate::{ProvisionError, Provisioner};
use dockhand_driver::Driver;
use dockhand_schema::{AuthOptions, EngineOptions, SwarmOptions};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

const ENGINE_PACKAGE: &str = "docker";
const ENGINE_SERVICE: &str = "docker";
const DAEMON_CONFIG_PATH: &str = "/etc/docker/daemon.json";
const UNIT_DROP_IN_DIR: &str = "/etc/systemd/system/docker.service.d";
const UNIT_DROP_IN_PATH: &str = "/etc/systemd/system/docker.service.d/10-dockhand.conf";
const DOCKERD_PATH: &str = "/usr/bin/dockerd";
const UNIX_SOCKET: &str = "unix:///var/run/docker.sock";
const ENGINE_PORT: u16 = 2376;
/// `install_url` value that leaves engine installation to the image.
const NO_INSTALL: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Zypper,
    Pacman,
}

impl PackageManager {
    pub fn for_release(release: &OsRelease) -> Option<Self> {
        if ["debian", "ubuntu", "raspbian"]
            .iter()
            .any(|id| release.is_like(id))
        {
            Some(Self::Apt)
        } else if ["fedora", "rhel", "centos"].iter().any(|id| release.is_like(id)) {
            Some(Self::Dnf)
        } else if release.id.starts_with("opensuse")
            || ["suse", "sles"].iter().any(|id| release.is_like(id))
        {
            Some(Self::Zypper)
        } else if ["arch", "manjaro"].iter().any(|id| release.is_like(id)) {
            Some(Self::Pacman)
        } else {
            None
        }
    }

    /// Distribution package providing a logical package name.
    pub fn package_name<'a>(self, name: &'a str) -> &'a str {
        match (self, name) {
            (Self::Apt | Self::Dnf, ENGINE_PACKAGE) => "docker-ce",
            _ => name,
        }
    }

    pub fn command(self, name: &str, action: PackageAction) -> String {
        let pkg = self.package_name(name);
        match (self, action) {
            (Self::Apt, PackageAction::Install) => {
                format!("sudo DEBIAN_FRONTEND=noninteractive apt-get install -y {pkg}")
            }
            (Self::Apt, PackageAction::Remove) => {
                format!("sudo DEBIAN_FRONTEND=noninteractive apt-get remove -y {pkg}")
            }
            (Self::Apt, PackageAction::Upgrade) => format!(
                "sudo apt-get update && sudo DEBIAN_FRONTEND=noninteractive apt-get install -y --only-upgrade {pkg}"
            ),
            (Self::Dnf, PackageAction::Install) => format!("sudo dnf install -y {pkg}"),
            (Self::Dnf, PackageAction::Remove) => format!("sudo dnf remove -y {pkg}"),
            (Self::Dnf, PackageAction::Upgrade) => format!("sudo dnf upgrade -y {pkg}"),
            (Self::Zypper, PackageAction::Install) => format!("sudo zypper -n install {pkg}"),
            (Self::Zypper, PackageAction::Remove) => format!("sudo zypper -n remove {pkg}"),
            (Self::Zypper, PackageAction::Upgrade) => format!("sudo zypper -n update {pkg}"),
            (Self::Pacman, PackageAction::Install) => {
                format!("sudo pacman -S --needed --noconfirm {pkg}")
            }
            (Self::Pacman, PackageAction::Remove) => format!("sudo pacman -R --noconfirm {pkg}"),
            (Self::Pacman, PackageAction::Upgrade) => format!("sudo pacman -Sy --noconfirm {pkg}"),
        }
    }
}

fn service_command(name: &str, action: ServiceAction) -> String {
    match action {
        ServiceAction::DaemonReload => "sudo systemctl daemon-reload".to_owned(),
        other => format!("sudo systemctl {other} {name}"),
    }
}

/// Quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Engine daemon configuration derived from the machine options.
///
/// Never contains `hosts`; see [`unit_drop_in`].
pub fn daemon_config(driver_name: &str, auth: &AuthOptions, engine: &EngineOptions) -> Value {
    let mut config = Map::new();
    if engine.tls_verify {
        config.insert("tlsverify".to_owned(), json!(true));
        config.insert("tlscacert".to_owned(), json!(auth.ca_cert_remote_path));
        config.insert("tlscert".to_owned(), json!(auth.server_cert_remote_path));
        config.insert("tlskey".to_owned(), json!(auth.server_key_remote_path));
    }

    let mut labels = engine.labels.clone();
    labels.push(format!("provider={driver_name}"));
    config.insert("labels".to_owned(), json!(labels));

    if !engine.insecure_registry.is_empty() {
        config.insert(
            "insecure-registries".to_owned(),
            json!(engine.insecure_registry),
        );
    }
    if !engine.registry_mirror.is_empty() {
        config.insert("registry-mirrors".to_owned(), json!(engine.registry_mirror));
    }
    if !engine.dns.is_empty() {
        config.insert("dns".to_owned(), json!(engine.dns));
    }
    if let Some(ref driver) = engine.storage_driver {
        config.insert("storage-driver".to_owned(), json!(driver));
    }
    if let Some(ref level) = engine.log_level {
        config.insert("log-level".to_owned(), json!(level));
    }
    if let Some(ref dir) = engine.graph_dir {
        config.insert("data-root".to_owned(), json!(dir));
    }
    if engine.selinux_enabled {
        config.insert("selinux-enabled".to_owned(), json!(true));
    }
    Value::Object(config)
}

/// systemd drop-in replacing the packaged `ExecStart`.
///
/// The TCP listener is only opened with TLS verification on; without it the
/// engine is reachable through the local socket alone.
pub fn unit_drop_in(engine: &EngineOptions) -> String {
    let mut exec = format!("{DOCKERD_PATH} -H {UNIX_SOCKET}");
    if engine.tls_verify {
        exec.push_str(&format!(" -H tcp://0.0.0.0:{ENGINE_PORT}"));
    }
    for flag in &engine.arbitrary_flags {
        exec.push(' ');
        if !flag.starts_with('-') {
            exec.push_str("--");
        }
        exec.push_str(flag);
    }

    let mut unit = String::from("[Service]\n");
    for var in &engine.env {
        unit.push_str(&format!("Environment=\"{}\"\n", var.replace('"', "\\\"")));
    }
    unit.push_str("ExecStart=\n");
    unit.push_str(&format!("ExecStart={exec}\n"));
    unit
}

/// Shell command writing `content` to `path` as root.
fn write_file_command(dir: &str, path: &str, content: &str) -> String {
    format!(
        "sudo mkdir -p {dir} && printf '%s' {} | sudo tee {path} >/dev/null",
        shell_quote(content)
    )
}

pub struct GenericLinuxProvisioner<'d> {
    driver: &'d dyn Driver,
    package_manager: PackageManager,
}

impl<'d> GenericLinuxProvisioner<'d> {
    pub fn new(driver: &'d dyn Driver, package_manager: PackageManager) -> Self {
        Self {
            driver,
            package_manager,
        }
    }

    pub fn package_manager(&self) -> PackageManager {
        self.package_manager
    }

    fn run(&self, operation: &str, command: &str) -> Result<String, ProvisionError> {
        debug!("{operation} on {}: {command}", self.driver.machine_name());
        self.driver
            .run_ssh_command(command)
            .map_err(|e| ProvisionError::ActionFailed {
                operation: operation.to_owned(),
                reason: e.to_string(),
            })
    }

    /// `install_url` of `none` skips installation, an empty one uses the
    /// distribution package, anything else is an install script run only
    /// when no engine is present yet.
    fn install_engine(&self, install_url: &str) -> Result<(), ProvisionError> {
        match install_url {
            NO_INSTALL => {
                debug!("engine installation disabled for {}", self.driver.machine_name());
                Ok(())
            }
            "" => self.package(ENGINE_PACKAGE, PackageAction::Install),
            url => {
                self.run(
                    "installing engine",
                    &format!(
                        "if ! command -v docker >/dev/null 2>&1; then curl -sSL {} | sh; fi",
                        shell_quote(url)
                    ),
                )?;
                Ok(())
            }
        }
    }

    fn ensure_tls_material(&self, auth: &AuthOptions) -> Result<(), ProvisionError> {
        for path in [
            &auth.ca_cert_remote_path,
            &auth.server_cert_remote_path,
            &auth.server_key_remote_path,
        ] {
            self.run(
                &format!("checking TLS material {path}"),
                &format!("sudo test -f {}", shell_quote(path)),
            )?;
        }
        Ok(())
    }
}

impl Provisioner for GenericLinuxProvisioner<'_> {
    fn name(&self) -> &'static str {
        "generic-linux"
    }

    fn package(&self, name: &str, action: PackageAction) -> Result<(), ProvisionError> {
        let command = self.package_manager.command(name, action);
        self.run(&format!("package {action} {name}"), &command)?;
        Ok(())
    }

    fn service(&self, name: &str, action: ServiceAction) -> Result<(), ProvisionError> {
        self.run(
            &format!("service {action} {name}"),
            &service_command(name, action),
        )?;
        Ok(())
    }

    fn provision(
        &self,
        swarm: &SwarmOptions,
        auth: &AuthOptions,
        engine: &EngineOptions,
    ) -> Result<(), ProvisionError> {
        if swarm.is_swarm {
            return Err(ProvisionError::Unsupported("swarm clustering".to_owned()));
        }

        info!("provisioning engine on {}", self.driver.machine_name());
        self.install_engine(&engine.install_url)?;

        if engine.tls_verify {
            self.ensure_tls_material(auth)?;
        } else {
            warn!(
                "TLS verification is off for {}; engine will only listen on {UNIX_SOCKET}",
                self.driver.machine_name()
            );
        }

        let config = daemon_config(self.driver.driver_name(), auth, engine);
        let mut rendered =
            serde_json::to_string_pretty(&config).map_err(|e| ProvisionError::ActionFailed {
                operation: "rendering engine configuration".to_owned(),
                reason: e.to_string(),
            })?;
        rendered.push('\n');
        self.run(
            "writing engine configuration",
            &write_file_command("/etc/docker", DAEMON_CONFIG_PATH, &rendered),
        )?;
        self.run(
            "writing engine unit override",
            &write_file_command(UNIT_DROP_IN_DIR, UNIT_DROP_IN_PATH, &unit_drop_in(engine)),
        )?;

        self.service(ENGINE_SERVICE, ServiceAction::DaemonReload)?;
        self.service(ENGINE_SERVICE, ServiceAction::Enable)?;
        self.service(ENGINE_SERVICE, ServiceAction::Restart)
    }
}

pub struct GenericLinuxFactory;

impl ProvisionerFactory for GenericLinuxFactory {
    fn name(&self) -> &'static str {
        "generic-linux"
    }

    fn compatible_with(&self, release: &OsRelease) -> bool {
        PackageManager::for_release(release).is_some()
    }

    fn create<'d>(&self, driver: &'d dyn Driver, release: &OsRelease) -> Box<dyn Provisioner + 'd> {
        // compatible_with() has already vetted the release.
        let manager = PackageManager::for_release(release).unwrap_or(PackageManager::Apt);
        Box::new(GenericLinuxProvisioner::new(driver, manager))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_driver::{DriverCall, MockDriver};

    fn release(id: &str, like: &[&str]) -> OsRelease {
        OsRelease {
            id: id.to_owned(),
            id_like: like.iter().map(|s| (*s).to_owned()).collect(),
            ..OsRelease::default()
        }
    }

    fn ssh_commands(driver: &MockDriver) -> Vec<String> {
        driver
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::RunSshCommand(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn package_manager_per_family() {
        assert_eq!(
            PackageManager::for_release(&release("ubuntu", &["debian"])),
            Some(PackageManager::Apt)
        );
        assert_eq!(
            PackageManager::for_release(&release("rocky", &["rhel", "centos", "fedora"])),
            Some(PackageManager::Dnf)
        );
        assert_eq!(
            PackageManager::for_release(&release("opensuse-tumbleweed", &[])),
            Some(PackageManager::Zypper)
        );
        assert_eq!(
            PackageManager::for_release(&release("manjaro", &["arch"])),
            Some(PackageManager::Pacman)
        );
        assert_eq!(PackageManager::for_release(&release("plan9", &[])), None);
    }

    #[test]
    fn engine_package_is_mapped() {
        assert_eq!(
            PackageManager::Apt.command("docker", PackageAction::Upgrade),
            "sudo apt-get update && sudo DEBIAN_FRONTEND=noninteractive apt-get install -y --only-upgrade docker-ce"
        );
        assert_eq!(
            PackageManager::Zypper.command("docker", PackageAction::Install),
            "sudo zypper -n install docker"
        );
        assert_eq!(
            PackageManager::Dnf.command("curl", PackageAction::Remove),
            "sudo dnf remove -y curl"
        );
    }

    #[test]
    fn service_uses_systemctl() {
        let driver = MockDriver::new("dev");
        let provisioner = GenericLinuxProvisioner::new(&driver, PackageManager::Apt);
        provisioner
            .service("docker", ServiceAction::Restart)
            .unwrap();
        provisioner
            .service("docker", ServiceAction::DaemonReload)
            .unwrap();
        assert_eq!(
            ssh_commands(&driver),
            vec!["sudo systemctl restart docker", "sudo systemctl daemon-reload"]
        );
    }

    #[test]
    fn ssh_failure_becomes_action_failure() {
        let driver = MockDriver::new("dev").failing_ssh("exit 100");
        let provisioner = GenericLinuxProvisioner::new(&driver, PackageManager::Dnf);
        let err = provisioner
            .package("docker", PackageAction::Upgrade)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ActionFailed { .. }));
        assert!(err.to_string().contains("package upgrade docker"));
    }

    #[test]
    fn daemon_config_reflects_options() {
        let engine = EngineOptions {
            labels: vec!["env=dev".to_owned()],
            insecure_registry: vec!["10.0.0.5:5000".to_owned()],
            storage_driver: Some("overlay2".to_owned()),
            ..EngineOptions::default()
        };
        let config = daemon_config("mock", &AuthOptions::default(), &engine);
        assert_eq!(config["tlsverify"], json!(true));
        assert_eq!(config["tlscacert"], json!("/etc/docker/ca.pem"));
        assert_eq!(config["labels"], json!(["env=dev", "provider=mock"]));
        assert_eq!(config["insecure-registries"], json!(["10.0.0.5:5000"]));
        assert_eq!(config["storage-driver"], json!("overlay2"));
        assert!(config.get("dns").is_none());
        assert!(config.get("data-root").is_none());
    }

    #[test]
    fn daemon_config_never_sets_hosts() {
        let config = daemon_config("mock", &AuthOptions::default(), &EngineOptions::default());
        assert!(config.get("hosts").is_none());

        let plain = EngineOptions {
            tls_verify: false,
            ..EngineOptions::default()
        };
        let config = daemon_config("mock", &AuthOptions::default(), &plain);
        assert!(config.get("hosts").is_none());
        assert!(config.get("tlsverify").is_none());
        assert!(config.get("tlscert").is_none());
    }

    #[test]
    fn drop_in_listens_on_tcp_only_with_tls() {
        let unit = unit_drop_in(&EngineOptions::default());
        assert!(unit.starts_with("[Service]\n"));
        assert!(unit.contains("ExecStart=\n"));
        assert!(unit.contains(
            "ExecStart=/usr/bin/dockerd -H unix:///var/run/docker.sock -H tcp://0.0.0.0:2376\n"
        ));

        let plain = EngineOptions {
            tls_verify: false,
            ..EngineOptions::default()
        };
        let unit = unit_drop_in(&plain);
        assert!(unit.contains("ExecStart=/usr/bin/dockerd -H unix:///var/run/docker.sock\n"));
        assert!(!unit.contains("tcp://"));
    }

    #[test]
    fn drop_in_carries_flags_and_environment() {
        let engine = EngineOptions {
            arbitrary_flags: vec!["debug".to_owned(), "--max-concurrent-downloads=5".to_owned()],
            env: vec!["HTTP_PROXY=http://proxy:3128".to_owned(), "A=\"b\"".to_owned()],
            ..EngineOptions::default()
        };
        let unit = unit_drop_in(&engine);
        assert!(unit.contains(":2376 --debug --max-concurrent-downloads=5\n"));
        assert!(unit.contains("Environment=\"HTTP_PROXY=http://proxy:3128\"\n"));
        assert!(unit.contains("Environment=\"A=\\\"b\\\"\"\n"));
    }

    #[test]
    fn provision_installs_configures_and_restarts() {
        let driver = MockDriver::new("dev");
        let provisioner = GenericLinuxProvisioner::new(&driver, PackageManager::Apt);
        provisioner
            .provision(
                &SwarmOptions::default(),
                &AuthOptions::default(),
                &EngineOptions::default(),
            )
            .unwrap();

        let commands = ssh_commands(&driver);
        assert_eq!(commands.len(), 9);
        assert_eq!(
            commands[0],
            "if ! command -v docker >/dev/null 2>&1; then curl -sSL 'https://get.docker.com' | sh; fi"
        );
        assert_eq!(commands[1], "sudo test -f '/etc/docker/ca.pem'");
        assert!(commands[4].contains("sudo tee /etc/docker/daemon.json"));
        assert!(commands[4].contains("provider=mock"));
        assert!(!commands[4].contains("\"hosts\""));
        assert!(commands[5]
            .contains("sudo tee /etc/systemd/system/docker.service.d/10-dockhand.conf"));
        assert!(commands[5].contains("-H tcp://0.0.0.0:2376"));
        assert_eq!(commands[6], "sudo systemctl daemon-reload");
        assert_eq!(commands[7], "sudo systemctl enable docker");
        assert_eq!(commands[8], "sudo systemctl restart docker");
    }

    #[test]
    fn provision_without_tls_skips_material_check() {
        let driver = MockDriver::new("dev");
        let provisioner = GenericLinuxProvisioner::new(&driver, PackageManager::Pacman);
        let engine = EngineOptions {
            tls_verify: false,
            ..EngineOptions::default()
        };
        provisioner
            .provision(&SwarmOptions::default(), &AuthOptions::default(), &engine)
            .unwrap();
        let commands = ssh_commands(&driver);
        assert!(!commands.iter().any(|c| c.contains("test -f")));
        assert!(!commands.iter().any(|c| c.contains("tcp://")));
    }

    #[test]
    fn empty_install_url_uses_package_manager() {
        let driver = MockDriver::new("dev");
        let provisioner = GenericLinuxProvisioner::new(&driver, PackageManager::Apt);
        let engine = EngineOptions {
            install_url: String::new(),
            ..EngineOptions::default()
        };
        provisioner
            .provision(&SwarmOptions::default(), &AuthOptions::default(), &engine)
            .unwrap();
        let commands = ssh_commands(&driver);
        assert!(commands[0].contains("apt-get install -y docker-ce"));
        assert!(!commands.iter().any(|c| c.contains("curl")));
    }

    #[test]
    fn install_url_none_skips_installation() {
        let driver = MockDriver::new("dev");
        let provisioner = GenericLinuxProvisioner::new(&driver, PackageManager::Apt);
        let engine = EngineOptions {
            install_url: "none".to_owned(),
            ..EngineOptions::default()
        };
        provisioner
            .provision(&SwarmOptions::default(), &AuthOptions::default(), &engine)
            .unwrap();
        let commands = ssh_commands(&driver);
        assert_eq!(commands.len(), 8);
        assert!(!commands
            .iter()
            .any(|c| c.contains("curl") || c.contains("apt-get")));
    }

    #[test]
    fn provision_refuses_swarm() {
        let driver = MockDriver::new("dev");
        let provisioner = GenericLinuxProvisioner::new(&driver, PackageManager::Apt);
        let swarm = SwarmOptions {
            is_swarm: true,
            ..SwarmOptions::default()
        };
        let err = provisioner
            .provision(&swarm, &AuthOptions::default(), &EngineOptions::default())
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Unsupported(_)));
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
