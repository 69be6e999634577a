use std::collections::{BTreeSet, HashSet};

use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info};

use super::context::FetchContext;
use super::unit::{FetchOutcome, FetchUnit};
use crate::core::error::{LauncherError, LauncherResult};

/// Summary of one `download_all` call.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub downloaded: usize,
    pub already_valid: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
    /// First failure of a unit that was not allowed to fail.
    pub first_error: Option<LauncherError>,
}

impl PoolReport {
    /// Turn a report with a required failure into that error.
    pub fn into_result(mut self) -> LauncherResult<Self> {
        match self.first_error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// A batch of fetch units downloaded with bounded concurrency.
#[derive(Debug)]
pub struct FetchPool {
    units: Vec<FetchUnit>,
    wait_for_completion: bool,
}

impl Default for FetchPool {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchPool {
    pub fn new() -> Self {
        Self {
            units: Vec::new(),
            wait_for_completion: true,
        }
    }

    /// A pool whose `download_all` returns as soon as the work is dispatched.
    pub fn detached() -> Self {
        Self {
            units: Vec::new(),
            wait_for_completion: false,
        }
    }

    pub fn add(&mut self, unit: FetchUnit) {
        self.units.push(unit);
    }

    pub fn add_all(&mut self, units: impl IntoIterator<Item = FetchUnit>) {
        self.units.extend(units);
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[FetchUnit] {
        &self.units
    }

    /// Bytes still to fetch: sizes of the units that need downloading.
    pub async fn total_size(&self, ctx: &FetchContext) -> LauncherResult<u64> {
        let sizes: Vec<LauncherResult<u64>> = stream::iter(&self.units)
            .map(|unit| async move {
                if unit.needs_download(ctx).await? {
                    Ok(unit.remote_size(ctx).await.unwrap_or(0))
                } else {
                    Ok(0)
                }
            })
            .buffer_unordered(ctx.concurrency)
            .collect()
            .await;

        sizes.into_iter().sum()
    }

    /// Drop duplicate destinations and every unit whose local copy is already
    /// good. Those still get their copy and post-processing steps here, so the
    /// returned pool holds only real network work.
    pub async fn downsize(self, ctx: &FetchContext) -> LauncherResult<FetchPool> {
        let mut seen = HashSet::new();
        let mut units = self.units;
        let before = units.len();
        units.retain(|u| seen.insert(u.dest.clone()));
        if units.len() != before {
            debug!("Dropped {} duplicate fetch units", before - units.len());
        }

        let checked: Vec<LauncherResult<Option<FetchUnit>>> = stream::iter(units)
            .map(|unit| async move {
                if unit.needs_download(ctx).await? {
                    return Ok(Some(unit));
                }
                unit.run_post_processors().await?;
                Ok(None)
            })
            .buffer_unordered(ctx.concurrency)
            .collect()
            .await;

        let mut remaining = Vec::new();
        for result in checked {
            if let Some(unit) = result? {
                remaining.push(unit);
            }
        }

        Ok(FetchPool {
            units: remaining,
            wait_for_completion: self.wait_for_completion,
        })
    }

    /// Fetch every unit. One unit failing never stops its siblings; units not
    /// yet started when the session is cancelled are skipped.
    pub async fn download_all(self, ctx: &FetchContext) -> LauncherResult<PoolReport> {
        let parents: BTreeSet<_> = self
            .units
            .iter()
            .filter_map(|u| u.dest.parent().map(|p| p.to_path_buf()))
            .collect();
        for parent in parents {
            tokio::fs::create_dir_all(&parent)
                .await
                .map_err(|e| LauncherError::io(&parent, e))?;
        }

        if let Some(session) = &ctx.session {
            session.add_total_downloads(self.units.len());
        }

        if self.wait_for_completion {
            Ok(run_units(self.units, ctx.clone()).await)
        } else {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let report = run_units(self.units, ctx).await;
                debug!("Detached pool finished: {:?}", report);
            });
            Ok(PoolReport::default())
        }
    }
}

async fn run_units(units: Vec<FetchUnit>, ctx: FetchContext) -> PoolReport {
    info!(
        "Starting batch download: {} files, concurrency={}",
        units.len(),
        ctx.concurrency
    );

    let results: Vec<_> = stream::iter(units)
        .map(|unit| {
            let ctx = &ctx;
            async move {
                if ctx.is_cancelled() {
                    return (unit, None);
                }
                let result = unit.download(ctx).await;
                (unit, Some(result))
            }
        })
        .buffer_unordered(ctx.concurrency)
        .collect()
        .await;

    let mut report = PoolReport::default();
    for (unit, result) in results {
        match result {
            None => report.skipped += 1,
            Some(Ok(FetchOutcome::Downloaded { bytes })) => {
                report.downloaded += 1;
                report.bytes += bytes;
            }
            Some(Ok(FetchOutcome::AlreadyValid)) => report.already_valid += 1,
            Some(Ok(FetchOutcome::FailedIgnored)) => report.failed += 1,
            Some(Err(e)) => {
                error!("Failed to fetch {} ({}): {}", unit.file_name(), unit.url, e);
                report.failed += 1;
                if !unit.ignore_failures {
                    ctx.cancel_session();
                    if report.first_error.is_none() {
                        report.first_error = Some(e);
                    }
                }
            }
        }
    }

    report
}
