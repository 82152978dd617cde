mod job_ack;
mod maintenance;
mod queue;
