// query/columns.rs - 列投影

use tracing::trace;

use super::types::ColumnSpec;
use crate::backend::QueryBackend;
use crate::error::ShapeResult;

/// 将后端限制为请求的列
pub struct ColumnProjector;

impl ColumnProjector {
    /// 空列表不改变默认投影
    pub fn apply<B: QueryBackend>(backend: &mut B, columns: &ColumnSpec) -> ShapeResult<()> {
        if columns.is_default() {
            return Ok(());
        }
        trace!(columns = ?columns.as_slice(), "projecting columns");
        backend.select(columns.as_slice())
    }
}
