//! Mach-domain collaborators of a session.
//!
//! Only their construction matters to the OS layer: each receives the shared
//! engine handle, and the port manager is seeded with the task's port.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use vm::EngineRef;

use super::utils::real_to_vm_abspath;

/// First port name handed out in a session.
pub const MACH_PORT_START: u32 = 2187;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MachoTask {
    /// Lowest address the task may hand out for new VM regions.
    pub min_offset: u64,
}

impl MachoTask {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Host-to-guest path shim rooted at the session's rootfs.
#[derive(Debug)]
pub struct FileSystem {
    engine: EngineRef,
    rootfs: PathBuf,
}

impl FileSystem {
    pub fn new(engine: EngineRef, rootfs: &Path) -> Self {
        Self {
            engine,
            rootfs: rootfs.to_path_buf(),
        }
    }

    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }

    pub fn guest_path(&self, host: &Path) -> String {
        real_to_vm_abspath(&self.rootfs, host)
    }

    pub fn host_path(&self, guest: &str) -> PathBuf {
        self.rootfs.join(guest.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MachPort {
    pub name: u32,
}

impl MachPort {
    pub fn new(name: u32) -> Self {
        Self { name }
    }
}

/// Port registry. Names are allocated upwards from the seed port.
#[derive(Debug)]
pub struct MachPortManager {
    engine: EngineRef,
    my_port: MachPort,
    ports: BTreeMap<u32, MachPort>,
    next_name: u32,
}

impl MachPortManager {
    pub fn new(engine: EngineRef, my_port: MachPort) -> Self {
        let mut ports = BTreeMap::new();
        ports.insert(my_port.name, my_port);
        Self {
            engine,
            my_port,
            ports,
            next_name: my_port.name + 1,
        }
    }

    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }

    pub fn my_port(&self) -> MachPort {
        self.my_port
    }

    pub fn allocate(&mut self) -> MachPort {
        let port = MachPort::new(self.next_name);
        self.next_name += 1;
        self.ports.insert(port.name, port);
        port
    }

    pub fn lookup(&self, name: u32) -> Option<MachPort> {
        self.ports.get(&name).copied()
    }
}

#[derive(Debug)]
pub struct MachHostServer {
    engine: EngineRef,
}

impl MachHostServer {
    pub fn new(engine: EngineRef) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }
}

#[derive(Debug)]
pub struct MachTaskServer {
    engine: EngineRef,
}

impl MachTaskServer {
    pub fn new(engine: EngineRef) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }
}

/// Everything built by `load()` for the Mach side of a session, in
/// construction order.
#[derive(Debug)]
pub struct MachDomain {
    pub task: MachoTask,
    pub fs: FileSystem,
    pub port_manager: MachPortManager,
    pub host_server: MachHostServer,
    pub task_server: MachTaskServer,
}

impl MachDomain {
    pub fn new(engine: &EngineRef, rootfs: &Path) -> Self {
        let task = MachoTask::new();
        let fs = FileSystem::new(EngineRef::clone(engine), rootfs);
        let port = MachPort::new(MACH_PORT_START);
        let port_manager = MachPortManager::new(EngineRef::clone(engine), port);
        let host_server = MachHostServer::new(EngineRef::clone(engine));
        let task_server = MachTaskServer::new(EngineRef::clone(engine));
        Self {
            task,
            fs,
            port_manager,
            host_server,
            task_server,
        }
    }
}
