use pyo3::prelude::*;

pub mod channel;
pub mod codec;
pub mod element;
pub mod error;
pub mod pulse;
pub mod sequence;
pub mod station;
pub mod waveform;

pub use channel::*;
pub use codec::*;
pub use element::*;
pub use error::*;
pub use pulse::*;
pub use sequence::*;
pub use station::*;
pub use waveform::*;

#[pymodule]
fn awgcompiler_backend(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Pulse>()?;
    m.add_class::<Element>()?;
    m.add_class::<Sequence>()?;
    m.add_class::<Station>()?;
    Ok(())
}
