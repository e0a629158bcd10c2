/*
 * This file is part of the Handover key/value store.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Command-line configuration, parsed with `clap`'s derive API.

use clap::Parser;

const HELP_TEMPLATE: &str = r#"
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
"#;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, help_template = HELP_TEMPLATE)]
pub struct Cli {
    /// TCP port to listen on
    #[arg(value_name = "PORT")]
    pub port: u16,

    /// Interface to bind
    #[arg(long, default_value = "127.0.0.1", value_name = "HOST")]
    pub host: String,

    /// Maximum number of simultaneously connected clients
    #[arg(long = "max-connections", default_value_t = 1024, value_name = "N")]
    pub max_connections: usize,
}

/// Resolved server configuration, built from parsed [`Cli`] arguments.
#[derive(Clone, Debug)]
pub struct Config {
    host: String,
    port: u16,
    max_connections: usize,
}

impl Config {
    pub fn host(&self) -> &str {
        &self.host
    }
    pub fn port(&self) -> u16 {
        self.port
    }
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            host: cli.host,
            port: cli.port,
            max_connections: cli.max_connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_only_port_given() {
        let cli = Cli::parse_from(["treed", "7878"]);
        let cfg = Config::from(cli);
        assert_eq!(cfg.port(), 7878);
        assert_eq!(cfg.host(), "127.0.0.1");
        assert_eq!(cfg.max_connections(), 1024);
        assert_eq!(cfg.bind_address(), "127.0.0.1:7878");
    }

    #[test]
    fn overrides_are_honored() {
        let cli = Cli::parse_from(["treed", "--host", "0.0.0.0", "--max-connections", "8", "1234"]);
        let cfg = Config::from(cli);
        assert_eq!(cfg.port(), 1234);
        assert_eq!(cfg.host(), "0.0.0.0");
        assert_eq!(cfg.max_connections(), 8);
    }
}
