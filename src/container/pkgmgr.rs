//! Package manager family table shared between the in-container install
//! flow and the virt engine's template hints.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistroClass {
    DebianBased,
    RhelBased,
    Alpine,
    Arch,
    Suse,
    Windows,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManager {
    pub name: &'static str,
    pub class: DistroClass,
    pub update_command: &'static str,
    pub install_command_template: &'static str,
}

/// Every family this flow recognizes, in probe order
pub const FAMILIES: &[PackageManager] = &[
    PackageManager {
        name: "apt-get",
        class: DistroClass::DebianBased,
        update_command: "apt-get update",
        install_command_template: "apt-get install -y {pkg}",
    },
    PackageManager {
        name: "dnf",
        class: DistroClass::RhelBased,
        update_command: "dnf check-update",
        install_command_template: "dnf install -y {pkg}",
    },
    PackageManager {
        name: "yum",
        class: DistroClass::RhelBased,
        update_command: "yum check-update",
        install_command_template: "yum install -y {pkg}",
    },
    PackageManager {
        name: "apk",
        class: DistroClass::Alpine,
        update_command: "apk update",
        install_command_template: "apk add {pkg}",
    },
    PackageManager {
        name: "pacman",
        class: DistroClass::Arch,
        update_command: "pacman -Sy",
        install_command_template: "pacman -S --noconfirm {pkg}",
    },
    PackageManager {
        name: "zypper",
        class: DistroClass::Suse,
        update_command: "zypper refresh",
        install_command_template: "zypper install -y {pkg}",
    },
];

impl PackageManager {
    pub fn install_command(&self, pkg: &str) -> String {
        self.install_command_template.replace("{pkg}", pkg)
    }

    /// Probes the given container/guest by checking each candidate
    /// binary in priority order, returning the first one present.
    pub async fn detect_in<F, Fut>(mut has_binary: F) -> Option<&'static PackageManager>
    where
        F: FnMut(&'static str) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for candidate in FAMILIES {
            if has_binary(candidate.name).await {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_command_substitutes_package_name() {
        let apt = &FAMILIES[0];
        assert_eq!(apt.install_command("curl"), "apt-get install -y curl");
    }

    #[tokio::test]
    async fn detect_in_returns_first_match_in_priority_order() {
        let found = PackageManager::detect_in(|name| async move { name == "dnf" || name == "apk" }).await;
        assert_eq!(found.unwrap().name, "dnf");
    }
}
