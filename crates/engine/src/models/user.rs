//! Customer account model.

use artisan_roast_core::{Email, UserId};

/// A registered customer.
///
/// All contact fields are optional; accounts created through the out-of-scope
/// auth layer may predate checkout and carry no phone or display name until
/// the contact backfill fills them in from a checkout session.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: Option<Email>,
    pub name: Option<String>,
    pub phone: Option<String>,
}
