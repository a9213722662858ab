//! Pure decision logic of the write path.

pub mod one_phase_commit;
pub mod server_side_retry;
pub mod uncertainty;

pub use one_phase_commit::{
    can_forward_commit_timestamp_without_refresh, is_end_txn_exceeding_deadline,
    is_end_txn_triggering_retry_error, is_one_phase_commit,
    maybe_bump_read_timestamp_to_write_timestamp,
};
pub use server_side_retry::{bump_batch_timestamp, can_do_serverside_retry};
pub use uncertainty::limit_txn_max_timestamp;
