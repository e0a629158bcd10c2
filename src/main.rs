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

use clap::Parser;
use handover::config::{Cli, Config};
use handover::server::Server;
use handover::util::error::Error;
use std::env;
use std::net::TcpListener;
use std::process;
use std::sync::Arc;

#[cfg(not(any(target_env = "msvc", miri)))]
use jemallocator::Jemalloc;

#[cfg(not(any(target_env = "msvc", miri)))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() {
    env_logger::Builder::new()
        .parse_filters(&env::var("TREED_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();

    #[cfg(unix)]
    {
        handover::signal::ignore_sigpipe();
        if let Err(e) = handover::signal::block_sigint_on_current_thread() {
            log::error!("failed to block SIGINT on the main thread: {e}");
            process::exit(1);
        }
    }

    let config = Config::from(Cli::parse());
    if let Err(e) = run(config) {
        log::error!("{e}");
        process::exit(1);
    }
}

fn run(config: Config) -> Result<(), Error> {
    let bind_address = config.bind_address();
    let listener = TcpListener::bind(&bind_address)
        .map_err(|e| Error::ioerror_extra(e, format!("binding to {bind_address}")))?;
    log::info!("listening on {bind_address}");

    let server = Arc::new(Server::new(config.max_connections()));
    handover::controlplane::run(server, listener)?;
    log::info!("shutdown complete");
    Ok(())
}
