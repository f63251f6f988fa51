//! Built-in template hints consulted by `Create` before explicit flags
//! override them.

use crate::virt::descriptor::ByteSize;

#[derive(Debug, Clone)]
pub struct TemplateHint {
    pub os_type: &'static str,
    pub default_disk: ByteSize,
    pub requires_efi: bool,
    pub requires_tpm: bool,
}

pub fn lookup(template: &str) -> Option<TemplateHint> {
    let gib = |n: u64| ByteSize::bytes(n * 1024 * 1024 * 1024);
    Some(match template {
        "ubuntu" => TemplateHint {
            os_type: "ubuntu",
            default_disk: gib(20),
            requires_efi: false,
            requires_tpm: false,
        },
        "debian" => TemplateHint {
            os_type: "debian",
            default_disk: gib(15),
            requires_efi: false,
            requires_tpm: false,
        },
        "alpine" => TemplateHint {
            os_type: "alpine",
            default_disk: gib(4),
            requires_efi: false,
            requires_tpm: false,
        },
        "windows10" => TemplateHint {
            os_type: "windows10",
            default_disk: gib(64),
            requires_efi: true,
            requires_tpm: false,
        },
        "windows11" => TemplateHint {
            os_type: "windows11",
            default_disk: gib(64),
            requires_efi: true,
            requires_tpm: true,
        },
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows11_requires_efi_and_tpm() {
        let hint = lookup("windows11").unwrap();
        assert!(hint.requires_efi);
        assert!(hint.requires_tpm);
    }

    #[test]
    fn unknown_template_returns_none() {
        assert!(lookup("plan9").is_none());
    }
}
