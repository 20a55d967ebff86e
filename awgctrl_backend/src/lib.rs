use pyo3::prelude::*;

pub mod adapter;
pub mod station;

pub use crate::adapter::*;
pub use crate::station::AwgStation;

#[pymodule]
fn awgctrl_backend(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<AwgStation>()?;
    Ok(())
}
