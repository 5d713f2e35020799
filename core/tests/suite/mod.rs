mod adapters_http;
mod gateway_flow;
mod policy_properties;
