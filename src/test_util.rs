use std::{
  env,
  process::{Command, Output},
};

const CHILD_FLAG: &str = "RPOOL_TEST_CHILD";

/// Whether this process is a child spawned by [`run_aborting_child`] or
/// [`run_isolated_child`].
pub(crate) fn is_test_child() -> bool {
  env::var_os(CHILD_FLAG).is_some()
}

fn run_child(test: &str) -> Output {
  Command::new(env::current_exe().unwrap())
    .args([test, "--exact", "--nocapture", "--test-threads=1"])
    .env(CHILD_FLAG, "1")
    .output()
    .unwrap()
}

/// Re-runs the single test `test` (full path, e.g. `pool::tests::name`) in a
/// child process, asserts it did not exit cleanly and returns its stderr.
pub(crate) fn run_aborting_child(test: &str) -> String {
  let output = run_child(test);
  assert!(
    !output.status.success(),
    "{test} was expected to abort:\n{}",
    String::from_utf8_lossy(&output.stdout)
  );
  String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Re-runs `test` in a child process of its own and asserts it passed. For
/// tests that tear down process-wide state.
pub(crate) fn run_isolated_child(test: &str) {
  let output = run_child(test);
  assert!(
    output.status.success(),
    "{test} failed in its own process:\n{}\n{}",
    String::from_utf8_lossy(&output.stdout),
    String::from_utf8_lossy(&output.stderr)
  );
}
