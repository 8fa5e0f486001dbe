#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use pgpress::db::LocalRepository;
use pgpress::models::{Actor, Format, NewTool, Position, PressNumber, Tool};
use pgpress::services::PressService;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores the previous values on unwind and serializes access to the
/// process environment across parallel tests.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

pub fn actor() -> Actor {
    Actor::new(1001, "Schichtleiter")
}

pub fn press(n: i16) -> PressNumber {
    PressNumber::new(n).unwrap()
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, d, 6, 0, 0).unwrap()
}

/// A service over a fresh in-memory repository. The repository handle is
/// returned too so tests can inject failures.
pub fn service() -> (Arc<LocalRepository>, PressService) {
    let repo = Arc::new(LocalRepository::new());
    let service = PressService::new(repo.clone());
    (repo, service)
}

pub async fn add_tool(
    service: &PressService,
    position: Position,
    code: &str,
    press_number: Option<i16>,
) -> Tool {
    let mut tool = NewTool::new(position, Format::new(120, 60), code).with_type("FC");
    if let Some(n) = press_number {
        tool = tool.on_press(press(n));
    }
    service.add_tool(tool).await.unwrap()
}
