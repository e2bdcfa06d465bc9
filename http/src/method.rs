use std::{
    fmt::{self, Display},
    str::FromStr,
};

/// HTTP request methods.
///
/// The set is the thirty-four verbs the request parser recognizes: the
/// RFC7231 methods plus the WebDAV, versioning, and UPnP extensions from the
/// [IANA method registry](https://www.iana.org/assignments/http-methods/http-methods.xhtml).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Method {
    /// The DELETE method requests that the origin server remove the target
    /// resource.
    Delete,

    /// The GET method requests transfer of the selected representation of
    /// the target resource.
    Get,

    /// The HEAD method is identical to GET except that the server MUST NOT
    /// send a message body in the response.
    Head,

    /// The POST method requests that the target resource process the
    /// representation enclosed in the request.
    Post,

    /// The PUT method requests that the target resource be created or
    /// replaced with the enclosed representation.
    Put,

    /// The CONNECT method requests a tunnel to the destination origin
    /// server.
    Connect,

    /// The OPTIONS method requests information about the communication
    /// options available for the target resource.
    Options,

    /// The TRACE method requests a remote application-level loop-back.
    Trace,

    /// The PATCH method requests a partial modification of the target
    /// resource. See RFC5789.
    Patch,

    /// The PURGE method asks a cache to drop the target resource.
    /// Non-standard but widely deployed.
    Purge,

    /// The COPY method creates a duplicate of the source resource. WebDAV,
    /// RFC4918.
    Copy,

    /// The LOCK method takes out a lock of any access type. WebDAV, RFC4918.
    Lock,

    /// The MKCOL method creates a new collection resource. WebDAV, RFC4918.
    MkCol,

    /// The MOVE method moves a resource to the URI in the Destination
    /// header. WebDAV, RFC4918.
    Move,

    /// The PROPFIND method retrieves properties of a resource. WebDAV,
    /// RFC4918.
    PropFind,

    /// The PROPPATCH method sets or removes properties of a resource.
    /// WebDAV, RFC4918.
    PropPatch,

    /// The SEARCH method initiates a server-side query scoped to the target
    /// resource. RFC5323.
    Search,

    /// The UNLOCK method removes a lock. WebDAV, RFC4918.
    Unlock,

    /// The BIND method adds a new binding to a collection. RFC5842.
    Bind,

    /// The REBIND method moves a binding to another collection. RFC5842.
    Rebind,

    /// The UNBIND method removes a binding from a collection. RFC5842.
    Unbind,

    /// The ACL method modifies the access control list of a resource.
    /// RFC3744.
    Acl,

    /// The REPORT method obtains information about a resource. RFC3253.
    Report,

    /// The MKACTIVITY method creates a new activity resource. RFC3253.
    MkActivity,

    /// The CHECKOUT method creates a working resource from a checked-in
    /// version. RFC3253.
    Checkout,

    /// The MERGE method performs a logical merge of a resource into the
    /// target. RFC3253.
    Merge,

    /// The M-SEARCH method searches for devices over multicast. UPnP.
    MSearch,

    /// The NOTIFY method delivers an event message. UPnP.
    Notify,

    /// The SUBSCRIBE method registers interest in event notifications. UPnP.
    Subscribe,

    /// The UNSUBSCRIBE method cancels a subscription. UPnP.
    Unsubscribe,

    /// The MKCALENDAR method creates a calendar collection. CalDAV, RFC4791.
    MkCalendar,

    /// The LINK method establishes a relationship between resources.
    /// RFC2068.
    Link,

    /// The UNLINK method removes a relationship between resources. RFC2068.
    Unlink,

    /// The SOURCE method requests the source of a media stream. Icecast.
    Source,
}

impl Method {
    /// every recognized method, in parser disambiguation order
    pub const ALL: [Method; 34] = [
        Method::Delete,
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Connect,
        Method::Options,
        Method::Trace,
        Method::Patch,
        Method::Purge,
        Method::Copy,
        Method::Lock,
        Method::MkCol,
        Method::Move,
        Method::PropFind,
        Method::PropPatch,
        Method::Search,
        Method::Unlock,
        Method::Bind,
        Method::Rebind,
        Method::Unbind,
        Method::Acl,
        Method::Report,
        Method::MkActivity,
        Method::Checkout,
        Method::Merge,
        Method::MSearch,
        Method::Notify,
        Method::Subscribe,
        Method::Unsubscribe,
        Method::MkCalendar,
        Method::Link,
        Method::Unlink,
        Method::Source,
    ];

    /// the method's canonical wire spelling
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Delete => "DELETE",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
            Method::Purge => "PURGE",
            Method::Copy => "COPY",
            Method::Lock => "LOCK",
            Method::MkCol => "MKCOL",
            Method::Move => "MOVE",
            Method::PropFind => "PROPFIND",
            Method::PropPatch => "PROPPATCH",
            Method::Search => "SEARCH",
            Method::Unlock => "UNLOCK",
            Method::Bind => "BIND",
            Method::Rebind => "REBIND",
            Method::Unbind => "UNBIND",
            Method::Acl => "ACL",
            Method::Report => "REPORT",
            Method::MkActivity => "MKACTIVITY",
            Method::Checkout => "CHECKOUT",
            Method::Merge => "MERGE",
            Method::MSearch => "M-SEARCH",
            Method::Notify => "NOTIFY",
            Method::Subscribe => "SUBSCRIBE",
            Method::Unsubscribe => "UNSUBSCRIBE",
            Method::MkCalendar => "MKCALENDAR",
            Method::Link => "LINK",
            Method::Unlink => "UNLINK",
            Method::Source => "SOURCE",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = crate::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or(crate::ParseError::InvalidMethod)
    }
}
