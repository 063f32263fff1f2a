use crate::nameserver::zones::Catalog;
use crate::resolver::{LookupResponse, Resolver};
use crate::shared::dns;
use crate::shared::dns::Question;
use crate::shared::net::*;

/// The nameserver handler able to serve dns requests via its [`DnsHandler`] implementation.
/// Authoritative answers come from the [`Catalog`]; names outside every configured zone
/// are resolved recursively through an embedded [`Resolver`] when the client requests it.
pub struct NameserverHandler {
    catalog: Catalog,
    resolver: Resolver,
}

impl NameserverHandler {
    pub fn new(catalog: Catalog, resolver: Resolver) -> Self {
        NameserverHandler { catalog, resolver }
    }
}

impl DnsHandler for NameserverHandler {
    fn handle_request<R: DnsRead, W: DnsWrite>(&self, req: R, resp: W) {
        handle_dns_request(req, resp, &self.catalog, &self.resolver);
    }
}

fn handle_dns_request<R: DnsRead, W: DnsWrite>(req: R, resp: W, catalog: &Catalog, resolver: &Resolver) {
    let dns_request = match req.read() {
        DnsReadResult::FullMessage(req) => req,
        DnsReadResult::HeaderOnly(hdr, err) => {
            handle_decode_err(resp, hdr, err);
            return;
        }
        DnsReadResult::ParseErr(msg_err, hdr_err) => {
            log::warn!("Decoding request: {:?}, decoding header: {:?}", msg_err, hdr_err);
            return;
        }
        DnsReadResult::IoErr(err) => {
            log::warn!("IO error: {:?}", err);
            return;
        }
    };

    let dns::Question { node, record_type, .. } = match validate_dns_request(&dns_request) {
        Ok(question) => question,
        Err(err) => {
            log::warn!("[{}] Request malformed: {}.", dns_request.id(), err);
            handle_err(resp, &dns_request, dns::RespCode::FormErr);
            return;
        }
    };

    log::info!(
        "[{}] Start handling request: node '{}', type {:?}.",
        dns_request.id(),
        node,
        record_type
    );

    log::debug!("[{}] Complete request: {:?}", dns_request.id(), dns_request);
    handle_query(dns_request, resp, catalog, resolver);
}

/// Resolve the dns query. Names owned by a configured zone are answered
/// authoritatively from the [`Catalog`]; everything else falls through to
/// recursive resolution when the client asked for it, otherwise an empty,
/// non-authoritative response is returned.
fn handle_query<W: DnsWrite>(request: dns::Message, resp: W, catalog: &Catalog, resolver: &Resolver) {
    let dns::Question { node, record_type, .. } = &request.questions[0];
    let (answers, authorities, found) = catalog.lookup(node, *record_type);

    if found {
        handle_authoritative(resp, request, answers, authorities);
        return;
    }

    if request.header.recursion_desired {
        handle_recursion(resp, request, resolver);
        return;
    }

    handle_empty(resp, &request);
}

/// Reply with an authoritative answer assembled from the [`Catalog`] lookup.
fn handle_authoritative<W: DnsWrite>(
    resp: W,
    request: dns::Message,
    answers: Vec<dns::Record>,
    authorities: Vec<dns::Record>,
) {
    let mut resp_header = resp_header_from_req_header(&request.header, dns::RespCode::NoError);
    resp_header.auth_answer = true;
    resp_header.recursion_available = true;
    resp_header.answers_count = answers.len() as u16;
    resp_header.authorities_count = authorities.len() as u16;
    resp_header.additionals_count = 0;
    let response = dns::Message {
        header: resp_header,
        questions: request.questions,
        answers,
        authorities,
        additionals: vec![],
    };

    reply(resp, response);
}

/// Delegate to the embedded [`Resolver`] for names outside every configured
/// zone. The resolver's answers already interleave the alias chain with the
/// final typed records in the right order, so they're forwarded as-is.
fn handle_recursion<W: DnsWrite>(resp: W, request: dns::Message, resolver: &Resolver) {
    let dns::Question { node, record_type, .. } = &request.questions[0];
    let lookup = resolver.new_lookup(node, *record_type);
    let (lookup_result, lookup_trace) = lookup.perform();
    if !lookup_trace.is_empty() {
        log::info!("[{}] Lookup trace:\n{}", request.id(), lookup_trace);
    }

    let (answers, authorities, additionals) = match lookup_result {
        Err(err) => {
            log::error!("[{}] Performing recursive lookup: {:?}", request.id(), err);
            handle_empty(resp, &request);
            return;
        }
        Ok(LookupResponse(answers, authorities, additionals, _)) => (answers, authorities, additionals),
    };

    let mut resp_header = resp_header_from_req_header(&request.header, dns::RespCode::NoError);
    resp_header.auth_answer = false;
    resp_header.recursion_available = true;
    resp_header.recursion_desired = true;
    resp_header.answers_count = answers.len() as u16;
    resp_header.authorities_count = authorities.len() as u16;
    resp_header.additionals_count = additionals.len() as u16;
    let response = dns::Message {
        header: resp_header,
        questions: request.questions,
        answers,
        authorities,
        additionals,
    };

    reply(resp, response);
}

/// Reply with an empty, non-authoritative, non-error response: the name is
/// not served by this nameserver and recursion wasn't requested.
fn handle_empty<W: DnsWrite>(resp: W, request: &dns::Message) {
    let mut resp_header = resp_header_from_req_header(&request.header, dns::RespCode::NoError);
    resp_header.auth_answer = false;
    resp_header.recursion_available = true;
    resp_header.answers_count = 0;
    resp_header.authorities_count = 0;
    resp_header.additionals_count = 0;
    let response = dns::Message {
        header: resp_header,
        questions: request.questions.clone(),
        answers: vec![],
        authorities: vec![],
        additionals: vec![],
    };

    reply(resp, response);
}

/// Handle decoding errors, either malformed messages or unsupported features.
/// If we cannot decode the header we cannot compose a valid response header,
/// so simply drop the request in these cases.
fn handle_decode_err<W: DnsWrite>(resp: W, req_header: dns::Header, msg_err: dns::MessageErr) {
    let parsing_err = msg_err.inner_err();
    let resp_code = match parsing_err {
        dns::ParsingErr::UnsupportedOpCode(_) => dns::RespCode::NotImp,
        dns::ParsingErr::UnsupportedClass(_) => dns::RespCode::NotImp,
        dns::ParsingErr::UnsupportedType(_) => dns::RespCode::NotImp,
        _ => dns::RespCode::FormErr,
    };
    let resp_header = resp_header_from_req_header(&req_header, resp_code);
    let dns_response = dns::Message {
        header: resp_header,
        questions: vec![],
        answers: vec![],
        authorities: vec![],
        additionals: vec![],
    };

    reply(resp, dns_response);
}

/// Generic error handler used to reply to a client with a specific error code.
/// Questions are included. NOTE: by default the response is not authoritative.
fn handle_err<W: DnsWrite>(resp: W, dns_req: &dns::Message, resp_code: dns::RespCode) {
    let mut resp_header = resp_header_from_req_header(&dns_req.header, resp_code);
    resp_header.auth_answer = false;
    resp_header.answers_count = 0;
    resp_header.authorities_count = 0;
    resp_header.additionals_count = 0;
    let dns_resp = dns::Message {
        header: resp_header,
        questions: dns_req.questions.clone(),
        answers: vec![],
        authorities: vec![],
        additionals: vec![],
    };

    reply(resp, dns_resp);
}

/// Reply to the client and log the outcome.
fn reply<W: DnsWrite>(resp: W, dns_response: dns::Message) {
    let response_id = dns_response.id();
    let response_code = dns_response.header.resp_code;
    log::debug!("[{}] Complete response: {:?}", response_id, dns_response);
    match resp.reply(dns_response) {
        Ok(_) => log::info!("[{}] Request served [{:?}].", response_id, response_code),
        Err(err) => log::error!("[{}] Error replying: {}", response_id, err),
    };
}

// Creates a proper header from the request header, suitable to be used in
// the corresponding response. The passed code is used in the resp header.
fn resp_header_from_req_header(req_header: &dns::Header, resp_code: dns::RespCode) -> dns::Header {
    dns::Header {
        query_resp: true,
        auth_answer: false,
        recursion_available: false,
        z: 0,
        resp_code,
        ..req_header.clone()
    }
}

// Validate a client dns request against some minimal requirements.
fn validate_dns_request(dns_req: &dns::Message) -> Result<&Question, String> {
    if !dns_req.header.is_request() {
        return Err(format!("resp flag set in query"));
    }
    if dns_req.header.answers_count != 0 {
        return Err(format!("invalid # of answers: {:?}", dns_req.header.answers_count));
    }
    if dns_req.header.authorities_count != 0 {
        return Err(format!(
            "invalid # of authorities: {:?}",
            dns_req.header.authorities_count
        ));
    }

    match dns_req.questions.as_slice() {
        [question] => Ok(question),
        _ => Err(format!("invalid # of questions: {:?}", dns_req.header.questions_count)),
    }
}
