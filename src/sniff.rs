//! Executable-header sniffing
//!
//! Decodes executable-format magic (ELF, Mach-O, PE) plus platform and
//! architecture fields, and maps known toolchain markers embedded in the
//! binary to a runtime. Only one platform/architecture pair is accepted as
//! valid for function binaries: linux/amd64. Any other recognized
//! executable yields an incompatibility warning and no classification.
//! Garbled or short headers are silently ignored - ambiguity is expected.

/// Toolchain that produced a function binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryToolchain {
    Go,
    Rust,
}

/// Outcome of sniffing a candidate binary's head bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sniff {
    /// linux/amd64 executable with a recognized toolchain marker
    Toolchain(BinaryToolchain),
    /// Recognized executable for a platform/arch pair we cannot deploy
    Incompatible { platform: String, arch: String },
    /// linux/amd64 executable without a recognized toolchain marker,
    /// or not an executable at all
    Unknown,
}

const ELF_MAGIC: &[u8] = b"\x7fELF";
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ELFOSABI_SYSV: u8 = 0;
const ELFOSABI_LINUX: u8 = 3;
const EM_X86_64: u16 = 62;

// Embedded section names / build-info magic. The Go linker writes the
// build-info blob and its section name near the start of the image; rustc
// leaves its version string in .comment and the metadata section name.
const GO_BUILDINFO_MAGIC: &[u8] = b"\xff Go buildinf:";
const GO_BUILDID_SECTION: &[u8] = b".note.go.buildid";
const RUSTC_VERSION_MARKER: &[u8] = b"rustc version";
const RUSTC_SECTION: &[u8] = b".rustc";

/// Decode head bytes of a candidate function binary.
pub fn sniff(bytes: &[u8]) -> Sniff {
    if bytes.starts_with(ELF_MAGIC) {
        return sniff_elf(bytes);
    }
    if let Some(sniffed) = sniff_macho(bytes) {
        return sniffed;
    }
    if let Some(sniffed) = sniff_pe(bytes) {
        return sniffed;
    }
    Sniff::Unknown
}

fn sniff_elf(bytes: &[u8]) -> Sniff {
    if bytes.len() < 20 {
        return Sniff::Unknown;
    }
    let class = bytes[4];
    let data = bytes[5];
    let osabi = bytes[7];
    let machine = if data == ELFDATA2LSB {
        u16::from_le_bytes([bytes[18], bytes[19]])
    } else {
        u16::from_be_bytes([bytes[18], bytes[19]])
    };

    let linux_amd64 = class == ELFCLASS64
        && data == ELFDATA2LSB
        && machine == EM_X86_64
        && (osabi == ELFOSABI_SYSV || osabi == ELFOSABI_LINUX);

    if !linux_amd64 {
        return Sniff::Incompatible {
            platform: "linux".to_string(),
            arch: elf_machine_name(machine).to_string(),
        };
    }

    match find_toolchain_marker(bytes) {
        Some(toolchain) => Sniff::Toolchain(toolchain),
        None => Sniff::Unknown,
    }
}

fn elf_machine_name(machine: u16) -> &'static str {
    match machine {
        3 => "386",
        40 => "arm",
        62 => "amd64",
        183 => "arm64",
        243 => "riscv64",
        _ => "unknown",
    }
}

fn sniff_macho(bytes: &[u8]) -> Option<Sniff> {
    if bytes.len() < 8 {
        return None;
    }
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    // 32/64-bit Mach-O, little-endian host order
    if magic != 0xfeed_face && magic != 0xfeed_facf {
        return None;
    }
    let cputype = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let arch = match cputype {
        0x0100_0007 => "amd64",
        0x0100_000c => "arm64",
        0x0000_0007 => "386",
        _ => "unknown",
    };
    Some(Sniff::Incompatible {
        platform: "darwin".to_string(),
        arch: arch.to_string(),
    })
}

fn sniff_pe(bytes: &[u8]) -> Option<Sniff> {
    if !bytes.starts_with(b"MZ") || bytes.len() < 0x40 {
        return None;
    }
    let e_lfanew =
        u32::from_le_bytes([bytes[0x3c], bytes[0x3d], bytes[0x3e], bytes[0x3f]]) as usize;
    let arch = bytes
        .get(e_lfanew..e_lfanew + 6)
        .filter(|header| header.starts_with(b"PE\0\0"))
        .map(|header| match u16::from_le_bytes([header[4], header[5]]) {
            0x8664 => "amd64",
            0xaa64 => "arm64",
            0x014c => "386",
            _ => "unknown",
        })
        .unwrap_or("unknown");
    Some(Sniff::Incompatible {
        platform: "windows".to_string(),
        arch: arch.to_string(),
    })
}

fn find_toolchain_marker(bytes: &[u8]) -> Option<BinaryToolchain> {
    if contains(bytes, GO_BUILDINFO_MAGIC) || contains(bytes, GO_BUILDID_SECTION) {
        return Some(BinaryToolchain::Go);
    }
    if contains(bytes, RUSTC_VERSION_MARKER) || contains(bytes, RUSTC_SECTION) {
        return Some(BinaryToolchain::Rust);
    }
    None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elf_header(class: u8, data: u8, osabi: u8, machine: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes[..4].copy_from_slice(ELF_MAGIC);
        bytes[4] = class;
        bytes[5] = data;
        bytes[6] = 1; // EV_CURRENT
        bytes[7] = osabi;
        let machine_bytes = if data == ELFDATA2LSB {
            machine.to_le_bytes()
        } else {
            machine.to_be_bytes()
        };
        bytes[18] = machine_bytes[0];
        bytes[19] = machine_bytes[1];
        bytes
    }

    #[test]
    fn test_linux_amd64_go_binary() {
        let mut bytes = elf_header(ELFCLASS64, ELFDATA2LSB, ELFOSABI_SYSV, EM_X86_64);
        bytes.extend_from_slice(GO_BUILDID_SECTION);
        assert_eq!(sniff(&bytes), Sniff::Toolchain(BinaryToolchain::Go));
    }

    #[test]
    fn test_linux_amd64_go_buildinfo_magic() {
        let mut bytes = elf_header(ELFCLASS64, ELFDATA2LSB, ELFOSABI_LINUX, EM_X86_64);
        bytes.extend_from_slice(GO_BUILDINFO_MAGIC);
        assert_eq!(sniff(&bytes), Sniff::Toolchain(BinaryToolchain::Go));
    }

    #[test]
    fn test_linux_amd64_rust_binary() {
        let mut bytes = elf_header(ELFCLASS64, ELFDATA2LSB, ELFOSABI_SYSV, EM_X86_64);
        bytes.extend_from_slice(b"rustc version 1.74.0 (79e9716c9 2023-11-13)");
        assert_eq!(sniff(&bytes), Sniff::Toolchain(BinaryToolchain::Rust));
    }

    #[test]
    fn test_wrong_arch_is_incompatible() {
        let mut bytes = elf_header(ELFCLASS64, ELFDATA2LSB, ELFOSABI_SYSV, 183);
        bytes.extend_from_slice(GO_BUILDID_SECTION);
        assert_eq!(
            sniff(&bytes),
            Sniff::Incompatible {
                platform: "linux".to_string(),
                arch: "arm64".to_string(),
            }
        );
    }

    #[test]
    fn test_macho_is_incompatible() {
        let mut bytes = 0xfeed_facf_u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0100_0007_u32.to_le_bytes());
        assert_eq!(
            sniff(&bytes),
            Sniff::Incompatible {
                platform: "darwin".to_string(),
                arch: "amd64".to_string(),
            }
        );
    }

    #[test]
    fn test_pe_is_incompatible() {
        let mut bytes = vec![0u8; 0x40];
        bytes[0] = b'M';
        bytes[1] = b'Z';
        bytes[0x3c] = 0x40;
        bytes.extend_from_slice(b"PE\0\0");
        bytes.extend_from_slice(&0x8664_u16.to_le_bytes());
        assert_eq!(
            sniff(&bytes),
            Sniff::Incompatible {
                platform: "windows".to_string(),
                arch: "amd64".to_string(),
            }
        );
    }

    #[test]
    fn test_valid_platform_without_marker_is_unknown() {
        let bytes = elf_header(ELFCLASS64, ELFDATA2LSB, ELFOSABI_SYSV, EM_X86_64);
        assert_eq!(sniff(&bytes), Sniff::Unknown);
    }

    #[test]
    fn test_garbled_header_is_unknown() {
        assert_eq!(sniff(b"\x7fEL"), Sniff::Unknown);
        assert_eq!(sniff(b"#!/bin/sh\necho hi\n"), Sniff::Unknown);
        assert_eq!(sniff(&[]), Sniff::Unknown);
    }
}
