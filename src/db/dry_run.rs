//! Offline runner used for dry runs.

use async_trait::async_trait;

use super::{postgres, snowflake, QueryRunner};
use crate::config::{Target, TargetKind};
use crate::error::Result;
use crate::query::{QueryStatus, ReadyQuery};

/// Runner that never opens a pool or a session.
///
/// Construction still checks that a connection could be described, so a
/// dry run catches a missing host or an invalid account.
#[derive(Debug)]
pub struct DryRunTarget {
    target: Target,
}

impl DryRunTarget {
    pub fn new(target: Target) -> Result<Self> {
        match target.kind {
            TargetKind::Postgres | TargetKind::Redshift => {
                postgres::connect_options(&target)?;
            }
            TargetKind::Snowflake => {
                snowflake::account_url(&target)?;
            }
        }
        Ok(Self { target })
    }
}

#[async_trait]
impl QueryRunner for DryRunTarget {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn run_query(
        &self,
        query: ReadyQuery,
        _dry_run: bool,
        _capture_output: bool,
    ) -> QueryStatus {
        QueryStatus::success(query, 0)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
