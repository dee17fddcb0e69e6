mod ldos_e2e;
mod routing_table;
mod simulator;
mod tcp_newreno;
