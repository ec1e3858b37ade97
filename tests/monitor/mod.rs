mod rpc_client;
mod runner;
