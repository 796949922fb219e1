pub mod async_utils;
pub mod logging;
pub mod serde;
pub mod utils;

pub use utils::log_internal_error;

/// Return type for async trait methods whose futures have to be `Send`.
///
/// Written as a macro so the expansion can name `Self::Error` of the implementing trait.
#[macro_export]
macro_rules! async_result {
    ($t:ty) => {
        impl ::std::future::Future<Output = ::std::result::Result<$t, Self::Error>> + Send
    };
}
