use clap::Parser;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "ionflow - finds symmetrically unique ion migration pathways in a crystal and estimates each barrier and kinetic prefactor via two-stage NEB.",
    help_template = HELP_TEMPLATE,
)]
pub struct Cli {
    /// Path to the input crystal structure in POSCAR format.
    /// Path task directories are created in the current directory.
    #[arg(value_name = "POSCAR")]
    pub input: PathBuf,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn only_the_input_is_required() {
        let cli = Cli::parse_from(["ionflow", "POSCAR"]);
        assert_eq!(cli.input, PathBuf::from("POSCAR"));
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.log_file, None);
    }

    #[test]
    fn ambient_flags_are_parsed() {
        let cli = Cli::parse_from(["ionflow", "cell.vasp", "-vv", "--log-file", "run.log"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_file, Some(PathBuf::from("run.log")));
    }

    #[test]
    fn pipeline_settings_are_not_exposed_as_flags() {
        for args in [
            ["ionflow", "POSCAR", "-m", "Na"],
            ["ionflow", "POSCAR", "--species", "Na"],
            ["ionflow", "POSCAR", "--max-distance", "5.5"],
            ["ionflow", "POSCAR", "--num-images", "5"],
        ] {
            assert!(Cli::try_parse_from(args).is_err(), "{args:?} was accepted");
        }
    }
}
