//! Model command line construction

use std::ffi::OsString;
use std::path::Path;

use crate::config::Config;

/// Subcommand that runs one model
const RUN_SUBCOMMAND: &str = "run";

/// Keeps the model from opening any interactive prompt
const HEADLESS_FLAG: &str = "--headless";

/// Flag naming the datastack file to read arguments from
const DATASTACK_FLAG: &str = "-d";

/// Builds the full argument vector for one model run
///
/// The result is
/// `<executable> <verbosity flag> run <model> --headless -d <datastack>`,
/// with the executable first. Arguments are passed to the process as-is,
/// so paths containing spaces need no quoting.
///
/// # Arguments
/// * `config` - Supplies the executable and the logging level
/// * `model_run_name` - The model's internal run name
/// * `datastack_path` - Where the run's datastack was written
pub fn build_invocation(config: &Config, model_run_name: &str, datastack_path: &Path) -> Vec<OsString> {
    vec![
        config.invest_exe.clone().into_os_string(),
        config.settings.logging_level.verbosity_flag().into(),
        RUN_SUBCOMMAND.into(),
        model_run_name.into(),
        HEADLESS_FLAG.into(),
        DATASTACK_FLAG.into(),
        datastack_path.as_os_str().to_os_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use workbench_core::domain::settings::LoggingLevel;

    #[test]
    fn test_invocation_shape() {
        let config = Config::new("/opt/invest/invest");
        let argv = build_invocation(&config, "carbon", Path::new("/tmp/data-1/datastack.json"));

        assert_eq!(
            argv,
            vec![
                OsString::from("/opt/invest/invest"),
                OsString::from("-vvv"),
                OsString::from("run"),
                OsString::from("carbon"),
                OsString::from("--headless"),
                OsString::from("-d"),
                OsString::from("/tmp/data-1/datastack.json"),
            ]
        );
    }

    #[test]
    fn test_verbosity_follows_logging_level() {
        let path = Path::new("/tmp/my data/datastack.json");
        let debug = Config::default().with_logging_level(LoggingLevel::Debug);
        let error = Config::default().with_logging_level(LoggingLevel::Error);

        assert_eq!(build_invocation(&debug, "carbon", path)[1], "--debug");
        assert_eq!(build_invocation(&error, "carbon", path)[1], "-v");
        assert_eq!(build_invocation(&error, "carbon", path)[6], "/tmp/my data/datastack.json");
    }
}
