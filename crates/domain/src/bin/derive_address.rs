use std::process;

use pi_sweeper_domain::config::{hydrate_env_file, SweeperConfig};
use pi_sweeper_domain::derive_keypair;

fn main() {
    if let Err(err) = hydrate_env_file() {
        eprintln!("failed to load .env: {err}");
        process::exit(1);
    }

    let config = match SweeperConfig::load_from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            process::exit(1);
        }
    };

    let keypair = match derive_keypair(config.recovery_phrase(), config.derivation_path()) {
        Ok(keypair) => keypair,
        Err(err) => {
            eprintln!("failed to derive keypair: {err}");
            process::exit(1);
        }
    };

    println!("Source address: {}", keypair.address());
    println!("Destination address: {}", config.destination());
}
