//! Pure windowing helpers: one form slices a materialized result set, the
//! other emits the equivalent pipeline stages. Both sanitize negative inputs
//! to zero and treat `limit == 0` as "no limit".

use dialhub_store::Stage;

pub const DEFAULT_PAGE_SIZE: i64 = 10;

fn sanitize(skip: i64, limit: i64) -> (usize, i64) {
    (skip.max(0) as usize, limit.max(0))
}

/// Window an already-sorted result set. The caller has computed the total
/// count beforehand; windowing never changes it.
pub fn window<T>(skip: i64, limit: i64, rows: Vec<T>) -> Vec<T> {
    let (skip, limit) = sanitize(skip, limit);
    let iter = rows.into_iter().skip(skip);
    if limit == 0 {
        iter.collect()
    } else {
        iter.take(limit as usize).collect()
    }
}

/// The pipeline-stage form of the same window, for branches that page inside
/// the aggregation itself.
pub fn stages(skip: i64, limit: i64) -> Vec<Stage> {
    let (skip, limit) = sanitize(skip, limit);
    let mut stages = vec![Stage::Skip(skip as i64)];
    if limit > 0 {
        stages.push(Stage::Limit(limit));
    }
    stages
}
