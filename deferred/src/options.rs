use std::io::IsTerminal as _;

use clap::{ColorChoice, Parser};

#[derive(Parser, Debug, Clone)]
pub struct Options {
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,
}

impl Options {
    /// Whether log output on stderr should use ANSI colors.
    pub fn use_color(&self) -> bool {
        match self.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => std::io::stderr().is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser, Debug)]
    #[command(no_binary_name = true)]
    struct Wrapper {
        #[command(flatten)]
        options: Options,
    }

    #[test]
    fn defaults() {
        let w = Wrapper::try_parse_from(Vec::<String>::new()).unwrap();
        assert!(!w.options.verbose);
        assert_eq!(w.options.color, ColorChoice::Auto);
    }

    #[test]
    fn explicit_color() {
        let w = Wrapper::try_parse_from(["-v", "--color", "never"]).unwrap();
        assert!(w.options.verbose);
        assert!(!w.options.use_color());
        let w = Wrapper::try_parse_from(["--color", "always"]).unwrap();
        assert!(w.options.use_color());
    }
}
