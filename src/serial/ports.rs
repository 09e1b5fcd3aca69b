use std::time::Duration;

use tracing::{debug, trace};

use crate::error::Error;

/// Device paths worth probing on this host.
fn candidates() -> Result<Vec<String>, Error> {
    if cfg!(windows) {
        Ok((1..=256).map(|n| format!("COM{n}")).collect())
    } else if cfg!(target_os = "linux") {
        // `/dev/tty` itself is the controlling terminal, so a letter must follow.
        Ok(dev_entries(|name| {
            name.strip_prefix("tty")
                .and_then(|rest| rest.chars().next())
                .map_or(false, |c| c.is_ascii_alphabetic())
        }))
    } else if cfg!(target_os = "macos") {
        Ok(dev_entries(|name| name.starts_with("tty.")))
    } else {
        Err(Error::UnsupportedPlatform(std::env::consts::OS.into()))
    }
}

fn dev_entries(keep: impl Fn(&str) -> bool) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir("/dev") else {
        return vec![];
    };

    let mut paths = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| keep(name))
        .map(|name| format!("/dev/{name}"))
        .collect::<Vec<_>>();

    paths.sort();
    paths
}

fn can_open(path: &str) -> bool {
    // Opened and dropped right away.
    match serialport::new(path, 9600)
        .timeout(Duration::from_millis(10))
        .open()
    {
        Ok(_) => true,
        Err(e) => {
            trace!(%path, ?e, "Port not usable");
            false
        }
    }
}

/// Keep the candidates `probe` accepts, in order.
pub(crate) fn probe_ports<I, P>(candidates: I, probe: P) -> Vec<String>
where
    I: IntoIterator<Item = String>,
    P: Fn(&str) -> bool,
{
    candidates.into_iter().filter(|path| probe(path)).collect()
}

/// List the serial ports which can be opened right now.
///
/// Every candidate device is briefly opened and closed again.
/// Fails with [`Error::UnsupportedPlatform`] on hosts without a known naming scheme.
pub fn enumerate_ports() -> Result<Vec<String>, Error> {
    let candidates = candidates()?;
    debug!("Probing {} candidate port(s)", candidates.len());

    Ok(probe_ports(candidates, can_open))
}
