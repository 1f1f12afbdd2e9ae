use clap::Parser;

#[derive(Parser)]
#[command(name = "crawld", version, about = "Breadth-first web crawler")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "./config.yaml")]
    pub config: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_flag_defaults_and_overrides() {
        let cli = Cli::parse_from(["crawld"]);
        assert_eq!(cli.config, "./config.yaml");

        let cli = Cli::parse_from(["crawld", "-c", "/etc/crawld.yaml"]);
        assert_eq!(cli.config, "/etc/crawld.yaml");

        let cli = Cli::parse_from(["crawld", "--config", "other.yaml"]);
        assert_eq!(cli.config, "other.yaml");
    }
}
