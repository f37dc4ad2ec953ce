use crate::error::MalformedEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Separator used by instrumented runtimes between an outer and an inner
/// class name.
const INNER_CLASS_SEPARATOR: char = '$';

/// A single observed trace event: one member invocation on one owner type.
///
/// Identity is structural on `(owner_type, member_name, parameter_types)`
/// only. The call depth and the static flag are carried through for
/// reporting, but two events differing only in those fields compress as the
/// same symbol — an overloaded member observed at depth 3 and depth 7 is
/// still the same member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Fully qualified name of the type owning the invoked member.
    pub owner_type: String,
    /// Name of the invoked member.
    pub member_name: String,
    /// Fully qualified parameter type names, in declaration order.
    pub parameter_types: Vec<String>,
    /// Call-stack depth at which the invocation was observed.
    pub call_depth: u32,
    /// Whether the member is static.
    pub is_static: bool,
}

impl TraceEvent {
    /// Creates an instance-level event at depth 0.
    pub fn new(
        owner_type: impl Into<String>,
        member_name: impl Into<String>,
        parameter_types: Vec<String>,
    ) -> Self {
        Self {
            owner_type: owner_type.into(),
            member_name: member_name.into(),
            parameter_types,
            call_depth: 0,
            is_static: false,
        }
    }

    /// Sets the observed call depth.
    pub fn with_depth(mut self, call_depth: u32) -> Self {
        self.call_depth = call_depth;
        self
    }

    /// Marks the member as static.
    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    /// Rejects events that cannot identify a member.
    pub(crate) fn check_well_formed(&self) -> Result<(), MalformedEvent> {
        if self.owner_type.is_empty() {
            return Err(MalformedEvent::MissingOwnerType);
        }
        if self.member_name.is_empty() {
            return Err(MalformedEvent::MissingMemberName);
        }
        Ok(())
    }

    /// Owner type without its package prefix, keeping inner-class names.
    pub fn packageless_owner(&self) -> &str {
        match self.owner_type.rfind('.') {
            Some(idx) => &self.owner_type[idx + 1..],
            None => &self.owner_type,
        }
    }

    /// Innermost simple name of the owner type.
    pub fn simple_owner(&self) -> &str {
        let start = self
            .owner_type
            .rfind(&[INNER_CLASS_SEPARATOR, '.'][..])
            .map(|idx| idx + 1)
            .unwrap_or(0);
        &self.owner_type[start..]
    }

    /// Package of the owner type, empty for the default package.
    pub fn owner_package(&self) -> &str {
        match self.owner_type.rfind('.') {
            Some(idx) => &self.owner_type[..idx],
            None => "",
        }
    }

    /// Whether the owner is an inner class.
    pub fn is_inner_class_call(&self) -> bool {
        self.owner_type.contains(INNER_CLASS_SEPARATOR)
    }
}

impl PartialEq for TraceEvent {
    fn eq(&self, other: &Self) -> bool {
        self.owner_type == other.owner_type
            && self.member_name == other.member_name
            && self.parameter_types == other.parameter_types
    }
}

impl Eq for TraceEvent {}

impl Hash for TraceEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner_type.hash(state);
        self.member_name.hash(state);
        self.parameter_types.hash(state);
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner_type, self.member_name)?;
        if !self.parameter_types.is_empty() {
            write!(f, "({})", self.parameter_types.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(event: &TraceEvent) -> u64 {
        let mut hasher = DefaultHasher::new();
        event.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_identity_ignores_depth_and_static() {
        let a = TraceEvent::new("shop.CartController", "addItem", vec!["long".into()]);
        let b = TraceEvent::new("shop.CartController", "addItem", vec!["long".into()])
            .with_depth(7)
            .with_static(true);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_identity_distinguishes_overloads() {
        let a = TraceEvent::new("shop.CartController", "addItem", vec!["long".into()]);
        let b = TraceEvent::new("shop.CartController", "addItem", vec!["long".into(), "int".into()]);

        assert_ne!(a, b);
    }

    #[test]
    fn test_well_formed_gate() {
        let ok = TraceEvent::new("shop.CartController", "addItem", vec![]);
        assert_eq!(ok.check_well_formed(), Ok(()));

        let no_owner = TraceEvent::new("", "addItem", vec![]);
        assert_eq!(
            no_owner.check_well_formed(),
            Err(MalformedEvent::MissingOwnerType)
        );

        let no_member = TraceEvent::new("shop.CartController", "", vec![]);
        assert_eq!(
            no_member.check_well_formed(),
            Err(MalformedEvent::MissingMemberName)
        );
    }

    #[test]
    fn test_owner_name_helpers() {
        let event = TraceEvent::new("shop.cart.CartController$Entry", "total", vec![]);
        assert_eq!(event.packageless_owner(), "CartController$Entry");
        assert_eq!(event.simple_owner(), "Entry");
        assert_eq!(event.owner_package(), "shop.cart");
        assert!(event.is_inner_class_call());

        let bare = TraceEvent::new("Main", "run", vec![]);
        assert_eq!(bare.packageless_owner(), "Main");
        assert_eq!(bare.simple_owner(), "Main");
        assert_eq!(bare.owner_package(), "");
    }

    #[test]
    fn test_display() {
        let event = TraceEvent::new("shop.CartController", "addItem", vec!["long".into()]);
        assert_eq!(event.to_string(), "shop.CartController#addItem(long)");

        let bare = TraceEvent::new("shop.CartController", "clear", vec![]);
        assert_eq!(bare.to_string(), "shop.CartController#clear");
    }
}
