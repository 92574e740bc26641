//! Transport layer module.

pub mod discovery;
pub mod mock;
pub mod nusb;
pub mod observable;
pub mod traits;

pub use self::nusb::NusbTransport;
pub use discovery::{AltSettingCandidate, EndpointDirection, InterfaceSelection, select_interface};
pub use mock::MockTransport;
pub use observable::ObservableTransport;
pub use traits::{TransportError, UsbTransport};
