use onvifsoap::{SoapError, SoapFault};
use thiserror::Error;

/// Classification shared by every error the client surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unclassified failures, typically network or HTTP level
    Unknown,
    /// SOAP faults and missing services, operations or types
    Protocol,
    /// WSDL document missing or unreadable
    Wsdl,
    /// Request could not be built from the given parameters
    Build,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OnvifError {
    #[error("Unknown error: {0}")]
    Unknown(String),
    #[error("{0}")]
    Protocol(String),
    #[error("{reason}")]
    Fault {
        code: String,
        subcode: Option<String>,
        reason: String,
    },
    #[error("{0}")]
    Wsdl(String),
    #[error("{0}")]
    Build(String),
}

impl OnvifError {
    pub fn protocol(reason: impl ToString) -> Self {
        OnvifError::Protocol(reason.to_string())
    }

    pub fn unknown_service(name: &str) -> Self {
        OnvifError::Protocol(format!("Unknown service: {name}"))
    }

    pub fn unsupported_service(name: &str) -> Self {
        OnvifError::Protocol(format!("device doesn't support service: {name}"))
    }

    pub fn method_not_found(operation: &str) -> Self {
        OnvifError::Protocol(format!("Method not found: {operation}"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OnvifError::Unknown(_) => ErrorKind::Unknown,
            OnvifError::Protocol(_) | OnvifError::Fault { .. } => ErrorKind::Protocol,
            OnvifError::Wsdl(_) => ErrorKind::Wsdl,
            OnvifError::Build(_) => ErrorKind::Build,
        }
    }

    /// Message of the underlying failure, without the kind prefix
    pub fn reason(&self) -> &str {
        match self {
            OnvifError::Unknown(r)
            | OnvifError::Protocol(r)
            | OnvifError::Wsdl(r)
            | OnvifError::Build(r) => r,
            OnvifError::Fault { reason, .. } => reason,
        }
    }

    /// The SOAP fault returned by the device, if that is what failed
    pub fn fault(&self) -> Option<SoapFault> {
        match self {
            OnvifError::Fault {
                code,
                subcode,
                reason,
            } => Some(SoapFault::new(code, subcode.as_deref(), reason)),
            _ => None,
        }
    }
}

impl From<SoapError> for OnvifError {
    fn from(err: SoapError) -> Self {
        match err {
            SoapError::Fault(fault) => OnvifError::Fault {
                code: fault.code,
                subcode: fault.subcode,
                reason: fault.reason,
            },
            SoapError::MethodNotFound(op) => OnvifError::method_not_found(&op),
            e @ (SoapError::TypeNotFound(_) | SoapError::PortNotFound(_)) => {
                OnvifError::Protocol(e.to_string())
            }
            SoapError::Build(msg) => OnvifError::Build(msg),
            SoapError::Wsdl { path, message } => {
                OnvifError::Wsdl(format!("{}: {message}", path.display()))
            }
            e @ (SoapError::Http { .. } | SoapError::HttpStatus { .. } | SoapError::Parse(_)) => {
                OnvifError::Unknown(e.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, OnvifError>;
