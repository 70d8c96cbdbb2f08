//! CLI error handling tests for gsd-mle.
//!
//! Every failure must exit with its stable code and leave no output file.

mod common;

use common::Workspace;
use predicates::prelude::*;

mod arguments {
    use super::*;

    #[test]
    fn missing_samples_argument_prints_usage() {
        Workspace::new()
            .cmd()
            .assert()
            .code(10)
            .stderr(predicate::str::contains("Usage"));
    }

    #[test]
    fn unknown_flag_fails() {
        Workspace::new()
            .cmd()
            .args(["samples.txt", "--nonexistent-flag"])
            .assert()
            .code(10)
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn invalid_kernel_value_fails() {
        Workspace::new()
            .cmd()
            .args(["samples.txt", "--kernel", "gaussian"])
            .assert()
            .code(10);
    }

    #[test]
    fn help_succeeds() {
        Workspace::new()
            .cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("samples_file").or(predicate::str::contains("SAMPLES_FILE")));
    }
}

mod inputs {
    use super::*;

    #[test]
    fn missing_samples_file_is_input_error() {
        let ws = Workspace::new();
        ws.cmd()
            .arg("absent.txt")
            .assert()
            .code(11)
            .stderr(predicate::str::contains("Input Not Found"));
        assert!(!ws.path("output.csv").exists());
    }

    #[test]
    fn malformed_sample_reports_line() {
        let ws = Workspace::new();
        ws.write("samples.txt", "1 2 1 2 1\n1 2 3\n");
        ws.cmd()
            .arg("samples.txt")
            .assert()
            .code(11)
            .stderr(predicate::str::contains("line 2"));
        assert!(!ws.path("output.csv").exists());
    }

    #[test]
    fn missing_grid_when_needed_is_input_error() {
        let ws = Workspace::new();
        ws.write("samples.txt", "6 1 1 1 1\n");
        ws.cmd().arg("samples.txt").assert().code(11);
        assert!(!ws.path("output.csv").exists());
    }

    #[test]
    fn truncated_grid_is_input_error() {
        let ws = Workspace::new();
        ws.write("samples.txt", "6 1 1 1 1\n");
        ws.write("grid.bin", [0u8; 30]);
        ws.cmd()
            .args(["samples.txt", "out.csv", "grid.bin"])
            .assert()
            .code(11)
            .stderr(predicate::str::contains("Malformed Grid File"));
    }

    #[test]
    fn empty_grid_with_pending_samples_is_config_error() {
        let ws = Workspace::new();
        ws.write("samples.txt", "6 1 1 1 1\n");
        ws.write("grid.bin", []);
        ws.cmd()
            .args(["samples.txt", "out.csv", "grid.bin"])
            .assert()
            .code(12)
            .stderr(predicate::str::contains("Empty Grid"));
        assert!(!ws.path("out.csv").exists());
    }
}

mod configuration {
    use super::*;

    #[test]
    fn out_of_range_fraction_in_file_is_config_error() {
        let ws = Workspace::new();
        ws.write("samples.txt", "1 2 1 2 1\n");
        ws.write("bad.toml", "memory_fraction = 1.5\n");
        ws.cmd()
            .args(["samples.txt", "--config", "bad.toml"])
            .assert()
            .code(12)
            .stderr(predicate::str::contains("memory_fraction"));
    }

    #[test]
    fn unknown_config_key_is_config_error() {
        let ws = Workspace::new();
        ws.write("samples.txt", "1 2 1 2 1\n");
        ws.write("bad.toml", "memory_fractoin = 0.5\n");
        ws.cmd()
            .args(["samples.txt", "--config", "bad.toml"])
            .assert()
            .code(12);
    }

    #[test]
    fn missing_config_path_is_config_error() {
        let ws = Workspace::new();
        ws.write("samples.txt", "1 2 1 2 1\n");
        ws.cmd()
            .args(["samples.txt", "--config", "nope.toml"])
            .assert()
            .code(12);
    }

    #[test]
    fn env_config_path_must_exist() {
        let ws = Workspace::new();
        ws.write("samples.txt", "1 2 1 2 1\n");
        ws.cmd()
            .arg("samples.txt")
            .env("GSD_CONFIG", ws.path("missing.toml"))
            .assert()
            .code(12)
            .stderr(predicate::str::contains("GSD_CONFIG"));
    }

    #[test]
    fn zero_fraction_override_is_config_error() {
        let ws = Workspace::new();
        ws.write("samples.txt", "1 2 1 2 1\n");
        ws.cmd()
            .args(["samples.txt", "--memory-fraction", "0"])
            .assert()
            .code(12);
    }

    #[test]
    fn tiny_device_limit_is_memory_budget_error() {
        let ws = Workspace::new();
        ws.write("samples.txt", "6 1 1 1 1\n");
        ws.write_grid("grid.bin");
        ws.cmd()
            .args(["samples.txt", "out.csv", "grid.bin", "--max-allocation-bytes", "10"])
            .assert()
            .code(12)
            .stderr(predicate::str::contains("Memory Budget Exceeded"));
        assert!(!ws.path("out.csv").exists());
    }
}

mod numerical {
    use super::*;

    #[test]
    fn beta_binomial_rejects_values_outside_categories() {
        let ws = Workspace::new();
        ws.write("samples.txt", "0 1 2 3 4
6 1 1 1 1
");
        ws.write_grid("grid.bin");
        ws.cmd()
            .args(["samples.txt", "out.csv", "grid.bin", "--kernel", "beta-binomial"])
            .assert()
            .code(20)
            .stderr(predicate::str::contains("sample 1"));
        assert!(!ws.path("out.csv").exists());
    }
}

mod structured {
    use super::*;

    #[test]
    fn jsonl_mode_prints_structured_error() {
        let ws = Workspace::new();
        let output = ws
            .cmd()
            .args(["absent.txt", "--log-format", "jsonl"])
            .output()
            .expect("run gsd-mle");
        assert_eq!(output.status.code(), Some(11));
        let stderr = String::from_utf8_lossy(&output.stderr);
        let line = stderr
            .lines()
            .rev()
            .find(|l| l.contains("\"code\""))
            .expect("structured error line");
        let value: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
        assert_eq!(value["code"], 22);
        assert_eq!(value["category"], "input");
    }
}
