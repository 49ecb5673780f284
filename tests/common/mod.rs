#![allow(dead_code)]

use std::sync::Arc;

use procvisor::exec::ProcessLauncher;
use procvisor::{Supervisor, SupervisorOptions};

pub use procvisor_test_utils::builders::SequentialIds;
pub use procvisor_test_utils::fake_process::{FakeLauncher, FakeProcessControl};
pub use procvisor_test_utils::{init_tracing, wait_for_status, with_timeout};

/// Supervisor over `launcher` with deterministic `worker-N` ids.
pub fn supervisor_with(launcher: Arc<dyn ProcessLauncher>) -> Supervisor {
    Supervisor::with_ids(
        launcher,
        Arc::new(SequentialIds::default()),
        SupervisorOptions::default(),
    )
}
