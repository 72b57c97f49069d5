//! RAII wrapper around the cuSPARSE handle
//!
//! The handle backs the `Sparselib` CSR strategy. It is bound to the
//! client's stream and must not be used concurrently from multiple
//! host threads.

#![allow(unsafe_op_in_unsafe_fn)]

use super::device::CudaError;
use cudarc::cusparse::sys::*;
use cudarc::driver::safe::CudaStream;
use std::ptr::null_mut;
use std::sync::Arc;

/// RAII cuSPARSE handle bound to a stream
pub struct CudaSparse {
    handle: cusparseHandle_t,
    stream: Arc<CudaStream>,
}

impl CudaSparse {
    /// Create a handle associated with `stream`
    pub fn new(stream: Arc<CudaStream>) -> Result<Self, CudaError> {
        unsafe {
            let mut handle = null_mut();
            check_cusparse(cusparseCreate(&mut handle))?;
            check_cusparse(cusparseSetStream(
                handle,
                stream.cu_stream() as cudaStream_t,
            ))?;
            Ok(Self { handle, stream })
        }
    }

    /// The raw handle
    #[inline]
    pub fn handle(&self) -> cusparseHandle_t {
        self.handle
    }

    /// The associated stream
    #[inline]
    pub fn stream(&self) -> &Arc<CudaStream> {
        &self.stream
    }

    /// CSR SpMV through the generic SpMV API: `y = alpha * A * x + beta * y`
    ///
    /// # Safety
    ///
    /// All pointers must be valid device pointers of the stated sizes
    /// on this handle's device.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn spmv_csr_f64(
        &self,
        rows: usize,
        cols: usize,
        nnz: usize,
        row_ptrs: u64,
        col_idxs: u64,
        values: u64,
        x: u64,
        y: u64,
        alpha: f64,
        beta: f64,
    ) -> Result<(), CudaError> {
        let mut mat = null_mut();
        check_cusparse(cusparseCreateCsr(
            &mut mat,
            rows as i64,
            cols as i64,
            nnz as i64,
            row_ptrs as *mut _,
            col_idxs as *mut _,
            values as *mut _,
            cusparseIndexType_t::CUSPARSE_INDEX_64I,
            cusparseIndexType_t::CUSPARSE_INDEX_64I,
            cusparseIndexBase_t::CUSPARSE_INDEX_BASE_ZERO,
            cudaDataType::CUDA_R_64F,
        ))?;
        let mut vec_x = null_mut();
        check_cusparse(cusparseCreateDnVec(
            &mut vec_x,
            cols as i64,
            x as *mut _,
            cudaDataType::CUDA_R_64F,
        ))?;
        let mut vec_y = null_mut();
        check_cusparse(cusparseCreateDnVec(
            &mut vec_y,
            rows as i64,
            y as *mut _,
            cudaDataType::CUDA_R_64F,
        ))?;

        let mut buffer_size = 0usize;
        check_cusparse(cusparseSpMV_bufferSize(
            self.handle,
            cusparseOperation_t::CUSPARSE_OPERATION_NON_TRANSPOSE,
            &alpha as *const f64 as *const _,
            mat,
            vec_x,
            &beta as *const f64 as *const _,
            vec_y,
            cudaDataType::CUDA_R_64F,
            cusparseSpMVAlg_t::CUSPARSE_SPMV_ALG_DEFAULT,
            &mut buffer_size,
        ))?;

        let mut buffer: u64 = 0;
        if buffer_size > 0 {
            let result = cudarc::driver::sys::cuMemAllocAsync(
                &mut buffer,
                buffer_size,
                self.stream.cu_stream(),
            );
            if result != cudarc::driver::sys::CUresult::CUDA_SUCCESS {
                return Err(CudaError::CusparseError(format!(
                    "workspace allocation failed: {:?}",
                    result
                )));
            }
        }

        let status = cusparseSpMV(
            self.handle,
            cusparseOperation_t::CUSPARSE_OPERATION_NON_TRANSPOSE,
            &alpha as *const f64 as *const _,
            mat,
            vec_x,
            &beta as *const f64 as *const _,
            vec_y,
            cudaDataType::CUDA_R_64F,
            cusparseSpMVAlg_t::CUSPARSE_SPMV_ALG_DEFAULT,
            buffer as *mut _,
        );

        if buffer != 0 {
            let _ =
                cudarc::driver::sys::cuMemFreeAsync(buffer, self.stream.cu_stream());
        }
        let _ = cusparseDestroyDnVec(vec_x);
        let _ = cusparseDestroyDnVec(vec_y);
        let _ = cusparseDestroySpMat(mat);
        check_cusparse(status)
    }
}

impl Drop for CudaSparse {
    fn drop(&mut self) {
        unsafe {
            let _ = cusparseDestroy(self.handle);
        }
    }
}

// cusparseHandle_t is a raw pointer; operations are serialized through
// the associated stream
unsafe impl Send for CudaSparse {}
unsafe impl Sync for CudaSparse {}

/// Check a cuSPARSE status code
pub fn check_cusparse(status: cusparseStatus_t) -> Result<(), CudaError> {
    if status == cusparseStatus_t::CUSPARSE_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(CudaError::CusparseError(format!("{:?}", status)))
    }
}
