//! Kubernetes Gateway API resources.

pub use gateway_api::apis::{
    experimental::{tcproutes::TCPRoute, tlsroutes::TLSRoute},
    standard::{
        gateways::Gateway as K8sGateway, grpcroutes::GRPCRoute, httproutes::HTTPRoute,
        referencegrants::ReferenceGrant,
    },
};
