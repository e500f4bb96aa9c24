//! Device shard calculator.
//!
//! Maps a device id to one of 1000 shards by taking the last eight hex
//! characters of `MD5(deviceId)` modulo 1000. Two modes:
//!
//! - `edgescript-shard MD5 <deviceId>`: prints the shard for one id
//! - `edgescript-shard SHARD_STDIN`: reads one device id per line and
//!   prints `<deviceId> <shard>` for each
//!
//! Exits with code 1 on argument errors.

use std::io::BufRead;
use std::process::ExitCode;

use md5::{Digest, Md5};

const TOTAL_SHARDS: u64 = 1000;

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Shard number: last eight hex chars of the MD5 digest, modulo the shard
/// count.
fn shard_of(device_id: &str) -> Result<u64, String> {
    let hash = md5_hex(device_id);
    let tail = &hash[24..32];
    let value = u64::from_str_radix(tail, 16).map_err(|e| {
        format!("Could not convert deviceId {device_id}, last eight chars of MD5 {tail}: {e}")
    })?;
    Ok(value % TOTAL_SHARDS)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [mode, device_id] if mode == "MD5" => match shard_of(device_id) {
            Ok(shard) => {
                println!("{shard}");
                ExitCode::SUCCESS
            }
            Err(message) => {
                eprintln!("{message}");
                ExitCode::FAILURE
            }
        },
        [mode] if mode == "SHARD_STDIN" => {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let device_id = line.trim();
                if device_id.is_empty() {
                    continue;
                }
                match shard_of(device_id) {
                    Ok(shard) => println!("{device_id} {shard}"),
                    Err(message) => eprintln!("{message}"),
                }
            }
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("usage: edgescript-shard MD5 <deviceId> | edgescript-shard SHARD_STDIN");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        // MD5("") = d41d8cd98f00b204e9800998ecf8427e; last 8 hex = ecf8427e.
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        let tail = u64::from_str_radix("ecf8427e", 16).unwrap();
        assert_eq!(shard_of("").unwrap(), tail % TOTAL_SHARDS);
    }

    #[test]
    fn shards_are_stable_and_bounded() {
        for id in ["device-a", "device-b", "0123456789abcdef"] {
            let first = shard_of(id).unwrap();
            let second = shard_of(id).unwrap();
            assert_eq!(first, second);
            assert!(first < TOTAL_SHARDS);
        }
    }
}
