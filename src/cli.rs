use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "File upload/download gateway over S3-compatible stores", long_about = None)]
pub struct Cli {
    /// Port to listen on (overrides PRODUCER_LISTEN_PORT)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the OpenAPI document as JSON and exit
    Openapi,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_runs_server() {
        let cli = Cli::try_parse_from(["producer"]).unwrap();
        assert!(cli.port.is_none());
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_port_override() {
        let cli = Cli::try_parse_from(["producer", "-p", "9000"]).unwrap();
        assert_eq!(cli.port, Some(9000));

        let cli = Cli::try_parse_from(["producer", "--port", "9001"]).unwrap();
        assert_eq!(cli.port, Some(9001));
    }

    #[test]
    fn test_openapi_subcommand() {
        let cli = Cli::try_parse_from(["producer", "openapi"]).unwrap();
        assert_eq!(cli.command, Some(Command::Openapi));
    }

    #[test]
    fn test_rejects_invalid_port() {
        assert!(Cli::try_parse_from(["producer", "--port", "http"]).is_err());
    }
}
