//! In-memory [`ContainerDriver`] used by tests across the crate.

use crate::container_management::docker_driver::ContainerDriver;
use crate::container_management::types::{ContainerSpec, ExecSpec, ExecStatus, ExecStream};
use crate::error_handling::types::DriverError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::io::AsyncReadExt;

enum ExecKind {
    /// A non-tty script exec; replies with canned output and the
    /// configured exit code.
    Script,
    /// A tty exec; bytes written to stdin are echoed back on stdout.
    Pty,
}

/// Scriptable driver: records every call, hands out echoing PTYs, and
/// can be told to fail specific operations.
pub struct MockDriver {
    pub calls: Mutex<Vec<String>>,
    pub images: Mutex<HashSet<String>>,
    pub builds: AtomicUsize,
    pub containers: Mutex<HashSet<String>>,
    pub removed: Mutex<Vec<String>>,
    pub created_specs: Mutex<Vec<ContainerSpec>>,
    pub validate_exit: Mutex<i64>,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_remove: AtomicBool,
    pub fail_exec_create: AtomicBool,
    next_id: AtomicU64,
    execs: Mutex<HashMap<String, ExecKind>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            images: Mutex::new(HashSet::new()),
            builds: AtomicUsize::new(0),
            containers: Mutex::new(HashSet::new()),
            removed: Mutex::new(Vec::new()),
            created_specs: Mutex::new(Vec::new()),
            validate_exit: Mutex::new(0),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            fail_exec_create: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            execs: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_validate_exit(&self, code: i64) {
        *self.validate_exit.lock().unwrap() = code;
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn echo_stream() -> ExecStream {
        let (client, server) = tokio::io::duplex(4096);
        let (mut server_read, mut server_write) = tokio::io::split(server);
        tokio::spawn(async move {
            let _ = tokio::io::copy(&mut server_read, &mut server_write).await;
        });

        let (client_read, client_write) = tokio::io::split(client);
        let output = futures_util::stream::unfold(client_read, |mut reader| async move {
            let mut buf = vec![0u8; 1024];
            match reader.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(buf), reader))
                }
                Err(e) => Some((Err(DriverError::Engine(e.to_string())), reader)),
            }
        });

        ExecStream {
            output: Box::pin(output),
            input: Box::pin(client_write),
        }
    }

    fn script_stream() -> ExecStream {
        let chunks: Vec<Result<Vec<u8>, DriverError>> = vec![Ok(b"mock script output\n".to_vec())];
        ExecStream {
            output: Box::pin(futures_util::stream::iter(chunks)),
            input: Box::pin(tokio::io::sink()),
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerDriver for MockDriver {
    async fn image_exists(&self, name: &str) -> Result<bool, DriverError> {
        self.record(format!("image_exists {}", name));
        Ok(self.images.lock().unwrap().contains(name))
    }

    async fn build_image(&self, name: &str, _dockerfile: &[u8]) -> Result<(), DriverError> {
        self.record(format!("build_image {}", name));
        // Long enough that racing ensure_image callers overlap.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.images.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, DriverError> {
        let id = self.fresh_id("mock-container");
        self.record(format!("create_container {}", id));
        self.created_specs.lock().unwrap().push(spec.clone());
        self.containers.lock().unwrap().insert(id.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), DriverError> {
        self.record(format!("start_container {}", id));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(DriverError::Engine("mock start failure".to_string()));
        }
        if !self.containers.lock().unwrap().contains(id) {
            return Err(DriverError::NotFound);
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str, grace_seconds: i64) -> Result<(), DriverError> {
        self.record(format!("stop_container {} grace={}", id, grace_seconds));
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(DriverError::Engine("mock stop failure".to_string()));
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), DriverError> {
        self.record(format!("remove_container {} force={}", id, force));
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(DriverError::Engine("mock remove failure".to_string()));
        }
        self.containers.lock().unwrap().remove(id);
        self.removed.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn exec_create(&self, id: &str, spec: &ExecSpec) -> Result<String, DriverError> {
        self.record(format!("exec_create {} {:?}", id, spec.cmd));
        if self.fail_exec_create.load(Ordering::SeqCst) {
            return Err(DriverError::Engine("mock exec_create failure".to_string()));
        }
        let exec_id = self.fresh_id("mock-exec");
        let kind = if spec.tty {
            ExecKind::Pty
        } else {
            ExecKind::Script
        };
        self.execs.lock().unwrap().insert(exec_id.clone(), kind);
        Ok(exec_id)
    }

    async fn exec_start(
        &self,
        exec_id: &str,
        hijack: bool,
        tty: bool,
    ) -> Result<ExecStream, DriverError> {
        self.record(format!("exec_start {} hijack={} tty={}", exec_id, hijack, tty));
        let execs = self.execs.lock().unwrap();
        match execs.get(exec_id) {
            Some(ExecKind::Pty) => Ok(Self::echo_stream()),
            Some(ExecKind::Script) => Ok(Self::script_stream()),
            None => Err(DriverError::NotFound),
        }
    }

    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecStatus, DriverError> {
        self.record(format!("exec_inspect {}", exec_id));
        if !self.execs.lock().unwrap().contains_key(exec_id) {
            return Err(DriverError::NotFound);
        }
        Ok(ExecStatus {
            exit_code: Some(*self.validate_exit.lock().unwrap()),
            running: false,
        })
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<String>, DriverError> {
        self.record(format!("list_containers {}", label));
        Ok(self.containers.lock().unwrap().iter().cloned().collect())
    }
}
