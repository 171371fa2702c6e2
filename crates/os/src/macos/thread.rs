/// Bookkeeping for the single emulated execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachoThread {
    pub id: u64,
    pub name: String,
}

impl MachoThread {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            name: format!("thread-{}", id),
        }
    }
}

#[derive(Debug)]
pub struct ThreadManagement {
    threads: Vec<MachoThread>,
    current: Option<usize>,
    next_id: u64,
}

impl ThreadManagement {
    pub fn new() -> Self {
        Self {
            threads: Vec::new(),
            current: None,
            next_id: 1,
        }
    }

    /// Creates a thread and returns its id. The thread is not scheduled.
    pub fn spawn(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.threads.push(MachoThread::new(id));
        id
    }

    pub fn set_current(&mut self, id: u64) -> bool {
        match self.threads.iter().position(|thread| thread.id == id) {
            Some(index) => {
                self.current = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn cur_thread(&self) -> Option<&MachoThread> {
        self.current.map(|index| &self.threads[index])
    }

    pub fn threads(&self) -> &[MachoThread] {
        &self.threads
    }
}

impl Default for ThreadManagement {
    fn default() -> Self {
        Self::new()
    }
}
