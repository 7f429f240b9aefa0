use std::fmt;

/// 128-bit fingerprint of `"<component>.<method>"`.
///
/// Every process built from the same names derives the same key without coordination, so
/// keys travel on the wire in place of method names and dispatch is a single hash lookup.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MethodKey([u8; 16]);

impl MethodKey {
    pub const LEN: usize = 16;

    pub fn new(component: &str, method: &str) -> Self {
        Self(md5::compute(format!("{component}.{method}")).0)
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 32 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

/// Fingerprint a `(component, method)` pair
pub fn make_method_key(component: &str, method: &str) -> MethodKey {
    MethodKey::new(component, method)
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodKey({})", self.to_hex())
    }
}

impl From<[u8; 16]> for MethodKey {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}
