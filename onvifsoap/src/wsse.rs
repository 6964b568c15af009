//! WS-Security `UsernameToken` header rendering

use xmltree::{Element, XMLNode};

pub const NS_WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const NS_WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const PASSWORD_DIGEST: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
pub const PASSWORD_TEXT: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
pub const NONCE_BASE64: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// How the `Password` element of a token must be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordType {
    Text,
    Digest,
}

impl PasswordType {
    pub fn uri(self) -> &'static str {
        match self {
            PasswordType::Text => PASSWORD_TEXT,
            PasswordType::Digest => PASSWORD_DIGEST,
        }
    }
}

/// A single-use WS-Security username token.
///
/// `password` carries either the plaintext password or the base64 SHA-1
/// digest, depending on `password_type`. `nonce` is base64 encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct UsernameToken {
    pub username: String,
    pub password: String,
    pub password_type: PasswordType,
    pub nonce: String,
    pub created: String,
}

impl std::fmt::Debug for UsernameToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let password = match self.password_type {
            PasswordType::Digest => self.password.as_str(),
            PasswordType::Text => "***",
        };
        f.debug_struct("UsernameToken")
            .field("username", &self.username)
            .field("password", &password)
            .field("password_type", &self.password_type)
            .field("nonce", &self.nonce)
            .field("created", &self.created)
            .finish()
    }
}

fn text_element(name: &str, text: &str) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    elem
}

impl UsernameToken {
    /// Builds the `wsse:Security` header block carrying this token
    pub fn to_element(&self, envelope_prefix: &str) -> Element {
        let mut password = text_element("wsse:Password", &self.password);
        password
            .attributes
            .insert("Type".to_string(), self.password_type.uri().to_string());

        let mut nonce = text_element("wsse:Nonce", &self.nonce);
        nonce
            .attributes
            .insert("EncodingType".to_string(), NONCE_BASE64.to_string());

        let mut token = Element::new("wsse:UsernameToken");
        token
            .children
            .push(XMLNode::Element(text_element("wsse:Username", &self.username)));
        token.children.push(XMLNode::Element(password));
        token.children.push(XMLNode::Element(nonce));
        token
            .children
            .push(XMLNode::Element(text_element("wsu:Created", &self.created)));

        let mut security = Element::new("wsse:Security");
        security
            .attributes
            .insert("xmlns:wsse".to_string(), NS_WSSE.to_string());
        security
            .attributes
            .insert("xmlns:wsu".to_string(), NS_WSU.to_string());
        security
            .attributes
            .insert(format!("{envelope_prefix}:mustUnderstand"), "1".to_string());
        security.children.push(XMLNode::Element(token));
        security
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(password_type: PasswordType) -> UsernameToken {
        UsernameToken {
            username: "admin".into(),
            password: "tuSZbXA1QoSgvx7ObuDGTdbknE8=".into(),
            password_type,
            nonce: "LKqI6G/AikKCQrN0zqZFlg==".into(),
            created: "2010-09-16T07:50:45.000Z".into(),
        }
    }

    #[test]
    fn security_header_carries_every_token_field() {
        let elem = token(PasswordType::Digest).to_element("s");

        assert_eq!(elem.name, "wsse:Security");
        assert_eq!(elem.attributes.get("s:mustUnderstand"), Some(&"1".to_string()));

        let ut = elem.get_child("wsse:UsernameToken").unwrap();
        let password = ut.get_child("wsse:Password").unwrap();
        assert_eq!(password.attributes.get("Type"), Some(&PASSWORD_DIGEST.to_string()));
        assert_eq!(
            password.get_text().unwrap(),
            "tuSZbXA1QoSgvx7ObuDGTdbknE8="
        );
        assert_eq!(
            ut.get_child("wsu:Created").unwrap().get_text().unwrap(),
            "2010-09-16T07:50:45.000Z"
        );
    }

    #[test]
    fn plaintext_tokens_use_the_text_type_and_hide_password_in_debug() {
        let mut t = token(PasswordType::Text);
        t.password = "secret".into();
        let elem = t.to_element("s");
        let password = elem
            .get_child("wsse:UsernameToken")
            .and_then(|ut| ut.get_child("wsse:Password"))
            .unwrap();
        assert_eq!(password.attributes.get("Type"), Some(&PASSWORD_TEXT.to_string()));
        assert!(!format!("{:?}", t).contains("secret"));
    }
}
