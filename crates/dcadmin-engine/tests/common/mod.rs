// Shared fakes for engine integration tests
#![allow(dead_code)]

use dcadmin_core::config::ClusterConfig;
use dcadmin_core::errors::{command_failed, ExError, ExErrorKind, Result};
use dcadmin_engine::exec::{BackgroundProcess, Executor};
use dcadmin_engine::kv::{KvConnector, KvSession};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::net::{Ipv4Addr, TcpListener};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SCHEMA_VERSION: i64 = 1528395834;
pub const DUMP_OUTPUT: &str = "COPY public.users (id) FROM stdin;\n1\n\\.\n";

#[derive(Clone)]
enum Reply {
    Stdout(Vec<u8>),
    Fail(String),
}

/// Executor that records commands and answers by substring match
///
/// Later rules take precedence over earlier ones, so a test can start from
/// [`FakeExecutor::healthy_cluster`] and override single commands.
#[derive(Default)]
pub struct FakeExecutor {
    rules: Vec<(String, Reply)>,
    log: RefCell<Vec<String>>,
    processes: RefCell<Vec<(String, Arc<AtomicBool>)>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cluster with one clean migration row and two user tables
    pub fn healthy_cluster() -> Self {
        Self::new()
            .respond("config current-context", "test-context\n")
            .respond("-l app=pgsql", "pgsql-0")
            .respond("-l app=redis-store", "redis-store-0")
            .respond(
                "array_to_json",
                &format!(" [{{\"version\":{},\"dirty\":false}}]\n", SCHEMA_VERSION),
            )
            .respond("information_schema.tables", " users\n repos\n\n")
            .respond("pg_dump", DUMP_OUTPUT)
    }

    pub fn respond(mut self, pattern: &str, stdout: &str) -> Self {
        self.rules
            .push((pattern.to_string(), Reply::Stdout(stdout.as_bytes().to_vec())));
        self
    }

    pub fn fail(mut self, pattern: &str, stderr: &str) -> Self {
        self.rules
            .push((pattern.to_string(), Reply::Fail(stderr.to_string())));
        self
    }

    fn reply_for(&self, command: &str) -> Reply {
        self.rules
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or(Reply::Stdout(Vec::new()))
    }

    /// Every command run so far, spawned processes included
    pub fn commands(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.log.borrow().iter().any(|c| c.contains(pattern))
    }

    /// Position of the first command containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.log.borrow().iter().position(|c| c.contains(pattern))
    }

    pub fn spawned(&self) -> Vec<String> {
        self.processes
            .borrow()
            .iter()
            .map(|(d, _)| d.clone())
            .collect()
    }

    pub fn all_terminated(&self) -> bool {
        self.processes
            .borrow()
            .iter()
            .all(|(_, t)| t.load(Ordering::SeqCst))
    }
}

impl Executor for FakeExecutor {
    fn run(&self, command: &str) -> Result<Vec<u8>> {
        self.log.borrow_mut().push(command.to_string());
        match self.reply_for(command) {
            Reply::Stdout(out) => Ok(out),
            Reply::Fail(stderr) => Err(command_failed(
                command,
                "exit status: 1",
                stderr.as_bytes(),
            )),
        }
    }

    fn run_to(&self, command: &str, sink: &mut dyn Write) -> Result<()> {
        let out = self.run(command)?;
        sink.write_all(&out)
            .map_err(|e| ExError::new(ExErrorKind::Io).with_message(e.to_string()))
    }

    fn spawn(&self, argv: &[String]) -> Result<Box<dyn BackgroundProcess>> {
        let description = argv.join(" ");
        self.log.borrow_mut().push(description.clone());
        let terminated = Arc::new(AtomicBool::new(false));
        self.processes
            .borrow_mut()
            .push((description.clone(), terminated.clone()));
        Ok(Box::new(FakeProcess {
            description,
            terminated,
        }))
    }
}

struct FakeProcess {
    description: String,
    terminated: Arc<AtomicBool>,
}

impl BackgroundProcess for FakeProcess {
    fn describe(&self) -> &str {
        &self.description
    }

    fn terminate(&mut self) -> Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct KvState {
    data: BTreeMap<String, Vec<u8>>,
    rejected: HashSet<String>,
    expire_on_dump: HashSet<String>,
    fail_ping: bool,
    refuse: bool,
    connects: Vec<u16>,
}

/// In-memory key-value store shared by all sessions it hands out
#[derive(Clone, Default)]
pub struct FakeKv {
    state: Rc<RefCell<KvState>>,
}

impl FakeKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, blob: &[u8]) -> Self {
        self.state
            .borrow_mut()
            .data
            .insert(key.to_string(), blob.to_vec());
        self
    }

    /// RESTORE of `key` fails as if the payload were corrupt
    pub fn rejecting(self, key: &str) -> Self {
        self.state.borrow_mut().rejected.insert(key.to_string());
        self
    }

    /// `key` is listed by KEYS but gone by the time DUMP runs
    pub fn expiring(self, key: &str) -> Self {
        self.state
            .borrow_mut()
            .expire_on_dump
            .insert(key.to_string());
        self
    }

    pub fn failing_ping(self) -> Self {
        self.state.borrow_mut().fail_ping = true;
        self
    }

    pub fn refusing(self) -> Self {
        self.state.borrow_mut().refuse = true;
        self
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state.borrow().data.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().data.len()
    }

    pub fn connects(&self) -> Vec<u16> {
        self.state.borrow().connects.clone()
    }
}

impl KvConnector for FakeKv {
    fn connect(&self, local_port: u16) -> Result<Box<dyn KvSession>> {
        let mut state = self.state.borrow_mut();
        if state.refuse {
            return Err(ExError::new(ExErrorKind::KvConnection)
                .with_op("kv_connect")
                .with_message("Connection refused (os error 111)"));
        }
        state.connects.push(local_port);
        Ok(Box::new(FakeKvSession {
            state: self.state.clone(),
        }))
    }
}

struct FakeKvSession {
    state: Rc<RefCell<KvState>>,
}

impl KvSession for FakeKvSession {
    fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        let prefix = pattern.trim_end_matches('*');
        Ok(self
            .state
            .borrow()
            .data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn dump_pipelined(&mut self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let state = self.state.borrow();
        Ok(keys
            .iter()
            .map(|k| {
                if state.expire_on_dump.contains(k) {
                    None
                } else {
                    state.data.get(k).cloned()
                }
            })
            .collect())
    }

    fn restore_replace(&mut self, key: &str, blob: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.rejected.contains(key) {
            return Err(ExError::new(ExErrorKind::KvCommand)
                .with_op("kv_restore")
                .with_subject(key)
                .with_message("ERR Bad data format"));
        }
        state.data.insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn ping(&mut self) -> Result<()> {
        if self.state.borrow().fail_ping {
            return Err(ExError::new(ExErrorKind::KvConnection)
                .with_op("kv_ping")
                .with_message("broken pipe"));
        }
        Ok(())
    }
}

/// A loopback port nothing is listening on
pub fn free_port() -> u16 {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Cluster config pointing the tunnel at a free port, with no settle delay
pub fn test_config() -> ClusterConfig {
    ClusterConfig::default()
        .with_local_kv_port(free_port())
        .with_tunnel_settle(Duration::ZERO)
}
