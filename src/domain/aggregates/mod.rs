//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod delivery_zone;

pub use product::{Product, ProductError, ProductImage, Review, StockAdjustment};
pub use order::{Actor, Order, OrderError, OrderLine, OrderStatus, OrderSummary, Outcome, PaymentMethod, PaymentStatus, ShippingAddress, TrackingInfo};
pub use cart::{Cart, CartError, CartItem};
pub use delivery_zone::DeliveryZone;
