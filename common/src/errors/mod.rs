#[macro_export]
macro_rules! herald_err {
    // Case with just a message literal
    ($kind:expr, $msg:expr) => {
        HeraldError {
            kind: $kind,
            message: $msg.into(),
            file: file!(),
            line: line!(),
        }
    };
    // Case with message + format arguments
    ($kind:expr, $fmt:expr, $($args:tt)*) => {
        HeraldError {
            kind: $kind,
            message: format!($fmt, $($args)*),
            file: file!(),
            line: line!(),
        }
    };
}

#[derive(Debug)]
pub struct HeraldError {
    pub kind: HeraldErrorKind,
    pub message: String,
    pub file: &'static str,
    pub line: u32,
}

impl std::fmt::Display for HeraldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} at {}:{}: {}",
            self.kind, self.file, self.line, self.message
        )
    }
}
impl std::error::Error for HeraldError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeraldErrorKind {
    Serialize,
    Deserialize,
    InvalidData,
    InvalidArgument,

    StreamRead,
    StreamWrite,
    StreamBind,
    StreamConnect,

    BusConnect,
    BusName,
    SignalEmit,
    ProxyCreate,
    MethodCall,

    FileOpen,
    DirCreate,

    TaskJoin,
}
