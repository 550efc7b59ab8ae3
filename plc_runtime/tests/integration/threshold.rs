//! Integration test: consecutive-failure threshold.
//!
//! k consecutive failed reads of a required input fault the engine;
//! k-1 failures followed by a valid read do not.

use super::common::*;
use plc_common::gateway::GatewayError;
use plc_runtime::error::EngineError;
use plc_runtime::report::RunOutcome;
use proptest::prelude::*;

fn runtime(k: u32, max_cycles: u64) -> String {
    format!("scan_period_ms = 1\nfailure_threshold = {k}\nmax_cycles = {max_cycles}\nretry_backoff_ms = 1")
}

/// Fail the sensor for `cycles` refreshes. INIT tallies each point once,
/// which consumes one extra injected failure.
fn fail_sensor(handle: &plc_gateway::SimulationHandle, cycles: u32) {
    handle.fail_point_times(
        &sensor(),
        GatewayError::Unreachable("flaky".into()),
        cycles + 1,
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn k_consecutive_failures_fault(k in 1u32..8) {
        let cfg = config(&runtime(k, u64::from(k) + 10));
        let (gw, handle) = simulation(&cfg);
        fail_sensor(&handle, k);
        let (program, tally) = Scripted::new();

        let report = run(&cfg, gw, program.boxed());

        let is_comm_fault = matches!(
            report.cause(),
            Some(EngineError::CommunicationFailure { address, .. }) if address == "di/1_01"
        );
        prop_assert!(is_comm_fault);
        // the k-th failing refresh ends the run before the program sees it
        prop_assert_eq!(report.cycles, u64::from(k) - 1);
        prop_assert_eq!(tally.cycles(), u64::from(k) - 1);
    }

    #[test]
    fn k_minus_one_then_valid_read_does_not_fault(k in 1u32..8) {
        let cycles = u64::from(k) + 3;
        let cfg = config(&runtime(k, cycles));
        let (gw, handle) = simulation(&cfg);
        fail_sensor(&handle, k - 1);
        let (program, _tally) = Scripted::new();

        let report = run(&cfg, gw, program.boxed());

        prop_assert_eq!(report.outcome, RunOutcome::CleanStop);
        prop_assert_eq!(report.cycles, cycles);
    }
}
