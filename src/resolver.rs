//! Query processing: turning a decoded query into a reply.
//!
//! Transports handle the actual I/O; the resolver decides what the answer
//! is. Answer lookup goes through a pluggable policy so a real directory
//! backend can replace the placeholder without touching the transports.

use std::net::Ipv4Addr;

use crate::message::{
    FLAG_AUTHORITATIVE, FLAG_REPLY, Message, Question, RData, Record, RecordClass,
};

/// Maps one question to its answer records.
///
/// A lookup miss is an empty vector, never an error; the reply then simply
/// carries zero answers for that question.
pub trait ResolvePolicy {
    fn resolve(&self, question: &Question) -> Vec<Record>;
}

/// Placeholder policy: every question gets the same fixed A record,
/// regardless of what was asked. Stands in until a real backend is wired up.
pub struct StaticAnswer;

impl ResolvePolicy for StaticAnswer {
    fn resolve(&self, _question: &Question) -> Vec<Record> {
        vec![Record {
            name: "example.com".to_string(),
            class: RecordClass::In,
            ttl: 0,
            rdata: RData::A(Ipv4Addr::new(127, 0, 0, 1)),
        }]
    }
}

/// Builds replies for decoded queries.
///
/// Owns the resolution policy; constructed once at startup and shared by
/// all transports.
pub struct Resolver {
    policy: Box<dyn ResolvePolicy>,
}

impl Resolver {
    pub fn new(policy: Box<dyn ResolvePolicy>) -> Self {
        Self { policy }
    }

    /// Build the reply for a query.
    ///
    /// The transaction id and question section are copied from the query,
    /// each question contributes whatever records the policy returns, and
    /// the authority and additional sections stay empty. This never fails;
    /// the worst case is a reply with zero answers.
    pub fn respond(&self, query: &Message) -> Message {
        let mut answers = Vec::new();
        for question in &query.questions {
            answers.extend(self.policy.resolve(question));
        }

        Message {
            id: query.id,
            // TODO: echo the recursion-desired bit once a recursing policy exists
            flags: FLAG_REPLY | FLAG_AUTHORITATIVE,
            questions: query.questions.clone(),
            answers,
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }
}
