//! Pseudorange recorder — an append-only newline-delimited JSON log of
//! every solved cluster, for offline analysis. Grounded on the reference
//! server's `persistence.rs` (tokio::fs, tolerant reopen-by-reconstructing).

use std::path::PathBuf;

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::cluster::Cluster;
use crate::solver::{Ecef, EcefCov};

#[derive(Debug, Serialize)]
struct PseudorangeRecord {
    icao: String,
    time: f64,
    ecef: [f64; 3],
    distinct: usize,
    dof: i32,
    cluster: Vec<[f64; 5]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ecef_cov: Option<[f64; 9]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    altitude_error: Option<f64>,
}

/// Resolves receiver ids in a cluster to ECEF positions so the recorder
/// doesn't need to borrow the receiver arena across an await point.
pub struct ClusterPositions<'a> {
    pub cluster: &'a Cluster,
    pub positions: Vec<[f64; 3]>,
}

pub struct PseudorangeRecorder {
    path: PathBuf,
    file: Option<File>,
}

impl PseudorangeRecorder {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    /// Open (or reopen) the log file for append. A reopen failure is
    /// logged and swallowed — the recorder simply stops writing until the
    /// next successful reopen, matching §7(d): I/O failures here must not
    /// propagate.
    pub async fn reopen(&mut self) {
        self.file = None; // close-then-append: drop the old handle first
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
        {
            Ok(f) => self.file = Some(f),
            Err(e) => warn!("pseudorange reopen failed for {:?}: {e}", self.path),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append one record for a solved cluster. Silently does nothing if
    /// the recorder was never (successfully) opened.
    pub async fn record(
        &mut self,
        icao: u32,
        wall_ts: f64,
        ecef: Ecef,
        ecef_cov: Option<EcefCov>,
        dof: i32,
        positions: &ClusterPositions<'_>,
        altitude: Option<f64>,
        altitude_error: Option<f64>,
    ) {
        let Some(file) = self.file.as_mut() else {
            return;
        };

        let t0 = positions.cluster.rows.first().map(|r| r.normalized_ts).unwrap_or(0.0);
        let cluster_state: Vec<[f64; 5]> = positions
            .cluster
            .rows
            .iter()
            .zip(positions.positions.iter())
            .map(|(row, pos)| {
                [
                    pos[0].round(),
                    pos[1].round(),
                    pos[2].round(),
                    ((row.normalized_ts - t0) * 1e6 * 10.0).round() / 10.0,
                    (row.variance * 1e12 * 100.0).round() / 100.0,
                ]
            })
            .collect();

        let record = PseudorangeRecord {
            icao: format!("{:06x}", icao),
            time: (wall_ts * 1000.0).round() / 1000.0,
            ecef: [ecef[0].round(), ecef[1].round(), ecef[2].round()],
            distinct: positions.cluster.distinct,
            dof,
            cluster: cluster_state,
            ecef_cov: ecef_cov.map(|c| {
                [
                    c[0][0].round(),
                    c[0][1].round(),
                    c[0][2].round(),
                    c[1][0].round(),
                    c[1][1].round(),
                    c[1][2].round(),
                    c[2][0].round(),
                    c[2][1].round(),
                    c[2][2].round(),
                ]
            }),
            altitude: altitude.map(|a| a.round()),
            altitude_error: altitude_error.map(|a| a.round()),
        };

        match serde_json::to_string(&record) {
            Ok(mut line) => {
                line.push('\n');
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    warn!("pseudorange write failed: {e}");
                }
            }
            Err(e) => warn!("pseudorange encode failed: {e}"),
        }
    }
}
