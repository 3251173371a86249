// Command line
//
// Only the generic sample arguments are understood. Anything else is passed
// over with a warning rather than rejected.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::DEFAULT_PATH;

pub const USAGE: &str = "\
Usage: spirv-specialization [OPTIONS]

Options:
  --save-images      Write the rendered frame to <image_name>.ppm
  --config <path>    Read settings from <path> (default: config.toml)
  --help             Print this message and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub config_path: PathBuf,
    pub save_images: bool,
    pub help: bool,
    pub ignored: Vec<String>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_PATH),
            save_images: false,
            help: false,
            ignored: Vec::new(),
        }
    }
}

impl Args {
    /// Parse arguments, not including the program name
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Args::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--save-images" => parsed.save_images = true,
                "--help" | "-h" => parsed.help = true,
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config_path = PathBuf::from(path);
                }
                _ => match arg.strip_prefix("--config=") {
                    Some(path) => parsed.config_path = PathBuf::from(path),
                    None => parsed.ignored.push(arg),
                },
            }
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments() {
        let args = Args::parse(Vec::<String>::new()).unwrap();
        assert_eq!(args, Args::default());
        assert_eq!(args.config_path, PathBuf::from("config.toml"));
    }

    #[test]
    fn known_flags() {
        let args = Args::parse(["--save-images", "--config", "alt.toml"]).unwrap();
        assert!(args.save_images);
        assert!(!args.help);
        assert_eq!(args.config_path, PathBuf::from("alt.toml"));
    }

    #[test]
    fn config_with_equals() {
        let args = Args::parse(["--config=other.toml"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("other.toml"));
    }

    #[test]
    fn config_without_path_is_an_error() {
        assert!(Args::parse(["--config"]).is_err());
    }

    #[test]
    fn unknown_arguments_are_collected() {
        let args = Args::parse(["--fullscreen", "--help", "extra"]).unwrap();
        assert!(args.help);
        assert_eq!(args.ignored, vec!["--fullscreen".to_string(), "extra".to_string()]);
    }
}
