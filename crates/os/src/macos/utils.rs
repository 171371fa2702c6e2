use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Flattens an environment map into `KEY=VALUE` strings, ready to be copied
/// onto the guest stack.
pub fn env_dict_to_array(env: &BTreeMap<String, String>) -> Vec<String> {
    env.iter().map(|(key, value)| format!("{}={}", key, value)).collect()
}

/// Translates a host path inside `rootfs` into the absolute path the guest
/// sees. Paths outside the rootfs are returned as normalised host paths.
pub fn real_to_vm_abspath(rootfs: &Path, path: &Path) -> String {
    let rootfs = normalize(&absolute(rootfs));
    let path = normalize(&absolute(path));

    match path.strip_prefix(&rootfs) {
        Ok(relative) => {
            let mut guest = String::from("/");
            guest.push_str(&relative.to_string_lossy());
            guest
        }
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("/"))
        .join(path)
}

/// Lexically resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_entries_are_key_value_pairs() {
        let mut env = BTreeMap::new();
        env.insert("HOME".to_string(), "/Users/guest".to_string());
        env.insert("LANG".to_string(), "C".to_string());
        assert_eq!(env_dict_to_array(&env), vec!["HOME=/Users/guest", "LANG=C"]);
    }

    #[test]
    fn host_path_inside_rootfs_becomes_guest_absolute() {
        let guest = real_to_vm_abspath(Path::new("/opt/rootfs/x8664_macos"), Path::new("/opt/rootfs/x8664_macos/bin/./ls"));
        assert_eq!(guest, "/bin/ls");
    }

    #[test]
    fn parent_components_are_resolved() {
        let guest = real_to_vm_abspath(Path::new("/opt/rootfs"), Path::new("/opt/rootfs/usr/../bin/sh"));
        assert_eq!(guest, "/bin/sh");
    }

    #[test]
    fn path_outside_rootfs_is_kept() {
        let guest = real_to_vm_abspath(Path::new("/opt/rootfs"), Path::new("/tmp/a.out"));
        assert_eq!(guest, "/tmp/a.out");
    }
}
